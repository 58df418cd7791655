//! Content digest primitives for retrieved payloads.
//!
//! Publishing and verification must agree on the digest algorithm, so the
//! whole workspace goes through this crate: [`digest`] on the publish side,
//! [`matches`] or a [`Sha256Hash`] comparison on the retrieval side.
//!
//! # Example
//!
//! ```
//! use w3bench_verify::{digest, matches};
//!
//! let hash = digest(b"abc");
//! assert!(matches(b"abc", &hash.to_string()));
//! assert!(!matches(b"abd", &hash.to_string()));
//! ```

pub use self::digest::{Sha256Hash, digest, matches};
pub use self::error::{Result, VerifyError};

mod digest;
mod error;
