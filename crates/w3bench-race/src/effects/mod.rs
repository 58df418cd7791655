//! I/O edge: retrieval transports, remote shells, name resolution.
//!
//! Every transport implements [`Retrieve`], a single-attempt capability. Retry,
//! verification and fan-out live above this layer and never branch on the
//! transport themselves; [`Retrievers`] does the per-endpoint selection.

mod http;
mod resolver;
mod router;
mod shell;
mod shell_http;
mod shell_tool;

use std::future::Future;

use bytes::Bytes;
use w3bench_verify::{Sha256Hash, digest};

use crate::data::Endpoint;
use crate::error::TransportError;

pub use http::{DirectHttp, HttpClient, Scheme};
pub use resolver::{Resolution, Resolved, parse_ipinfo, resolve};
pub use router::Retrievers;
pub use shell::{RemoteShell, ShellOutput, SshShell, discover_target};
pub use shell_http::ShellHttp;
pub use shell_tool::{PendingCleanups, ShellTool, ToolSpec};

#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
#[cfg(feature = "reqwest")]
pub use resolver::GeoLocator;

/// What a successful attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The retrieved bytes, hashed locally.
    Bytes(Bytes),
    /// A digest computed where the bytes landed.
    Digest(Sha256Hash),
}

impl Payload {
    pub fn digest(&self) -> Sha256Hash {
        match self {
            Payload::Bytes(bytes) => digest(bytes),
            Payload::Digest(hash) => *hash,
        }
    }
}

/// One retrieval attempt of `locator` through `endpoint`.
///
/// Implementations do not retry and do not verify; a transport, protocol or
/// authentication failure is returned as a [`TransportError`].
pub trait Retrieve: Send + Sync {
    fn attempt(
        &self,
        endpoint: &Endpoint,
        locator: &str,
    ) -> impl Future<Output = Result<Payload, TransportError>> + Send;
}

impl<R: Retrieve> Retrieve for std::sync::Arc<R> {
    fn attempt(
        &self,
        endpoint: &Endpoint,
        locator: &str,
    ) -> impl Future<Output = Result<Payload, TransportError>> + Send {
        (**self).attempt(endpoint, locator)
    }
}
