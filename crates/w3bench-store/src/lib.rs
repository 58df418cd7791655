//! Reference store: the JSON file of published content that retrieval
//! races are run against.
//!
//! ```json
//! {
//!     "swarm": { "100": [ { "locator": "…", "expectedDigestHex": "…" } ] },
//!     "ipfs":  { "100": [ { "locator": "Qm…?filename=Qm…", "expectedDigestHex": "…" } ] }
//! }
//! ```

mod error;
mod store;

pub use error::{Result, StoreError};
pub use store::{ReferenceStore, StoredRecord};
