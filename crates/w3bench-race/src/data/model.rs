use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use w3bench_verify::Sha256Hash;

use crate::error::Error;

/// A decentralized storage network content is published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Swarm,
    Ipfs,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Swarm, Backend::Ipfs];

    /// Gateway path segment preceding the locator.
    pub fn path_prefix(&self) -> &'static str {
        match self {
            Backend::Swarm => "bzz",
            Backend::Ipfs => "ipfs",
        }
    }

    /// Port of the node API when a target address carries none.
    pub fn default_api_port(&self) -> u16 {
        match self {
            Backend::Swarm => 1633,
            Backend::Ipfs => 8080,
        }
    }

    /// Key used in the reference store file.
    pub fn key(&self) -> &'static str {
        match self {
            Backend::Swarm => "swarm",
            Backend::Ipfs => "ipfs",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Swarm => write!(f, "Swarm"),
            Backend::Ipfs => write!(f, "Ipfs"),
        }
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "swarm" => Ok(Backend::Swarm),
            "ipfs" => Ok(Backend::Ipfs),
            other => Err(Error::Config(format!("unknown backend '{other}'"))),
        }
    }
}

/// A piece of content published to one backend.
///
/// Immutable once created; the reference store only ever appends them.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    pub backend: Backend,
    /// Payload size class in KB.
    pub size_kb: u32,
    pub locator: String,
    pub expected_digest: Sha256Hash,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub upload_duration: Option<Duration>,
}

impl ContentRecord {
    pub fn new(backend: Backend, size_kb: u32, locator: impl Into<String>, expected_digest: Sha256Hash) -> Self {
        Self {
            backend,
            size_kb,
            locator: locator.into(),
            expected_digest,
            uploaded_at: None,
            upload_duration: None,
        }
    }

    pub fn uploaded(mut self, at: DateTime<Utc>, duration: Duration) -> Self {
        self.uploaded_at = Some(at);
        self.upload_duration = Some(duration);
        self
    }
}

/// How an endpoint is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// GET against a public gateway.
    Http,
    /// `curl` run on a control host against a third address.
    RemoteShellHttp,
    /// Long-running download tool run on a control host.
    RemoteShellTool,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Http => write!(f, "http"),
            Transport::RemoteShellHttp => write!(f, "ssh-http"),
            Transport::RemoteShellTool => write!(f, "ssh-tool"),
        }
    }
}

/// Approximate geographic origin of an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
}

/// A concrete server a backend is reached through.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub backend: Backend,
    pub transport: Transport,
    /// Gateway host for [`Transport::Http`], control host for remote-shell transports.
    pub address: String,
    /// Address fetched from on the control host ([`Transport::RemoteShellHttp`] only).
    pub target: Option<String>,
    pub location: Option<Location>,
}

impl Endpoint {
    pub fn http(backend: Backend, address: impl Into<String>) -> Self {
        Self {
            backend,
            transport: Transport::Http,
            address: address.into(),
            target: None,
            location: None,
        }
    }

    pub fn shell_http(backend: Backend, control_host: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            backend,
            transport: Transport::RemoteShellHttp,
            address: control_host.into(),
            target: Some(target.into()),
            location: None,
        }
    }

    pub fn shell_tool(backend: Backend, control_host: impl Into<String>) -> Self {
        Self {
            backend,
            transport: Transport::RemoteShellTool,
            address: control_host.into(),
            target: None,
            location: None,
        }
    }

    pub fn with_location(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    pub fn city(&self) -> &str { self.location.as_ref().map_or("unknown", |l| l.city.as_str()) }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{}:{} -> {}", self.transport, self.address, target),
            None => write!(f, "{}:{}", self.transport, self.address),
        }
    }
}

/// Why an outcome did not produce verified content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeError {
    /// Last attempt failed at the transport level.
    Transport,
    /// Last attempt exceeded its time bound.
    Timeout,
    /// Last attempt returned content whose digest did not match.
    Integrity,
    /// The race deadline passed before the endpoint finished.
    Cancelled,
    /// The endpoint's task died before reporting.
    Aborted,
}

impl fmt::Display for OutcomeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeError::Transport => "transport",
            OutcomeError::Timeout => "timeout",
            OutcomeError::Integrity => "integrity",
            OutcomeError::Cancelled => "cancelled",
            OutcomeError::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Extra read issued right after a verified retrieval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondaryRead {
    pub elapsed: Duration,
    pub matched: bool,
}

/// Result of one endpoint's full attempt sequence for one record.
///
/// `elapsed` is measured from the start of the first attempt. On a match it
/// ends at the matching attempt; on exhaustion it is the cumulative time
/// spent on every attempt, backoff included.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub endpoint: Endpoint,
    pub record: ContentRecord,
    pub elapsed: Duration,
    pub attempts_used: u32,
    pub digest_matched: bool,
    pub error: Option<OutcomeError>,
    pub secondary: Option<SecondaryRead>,
}

impl RetrievalOutcome {
    pub(crate) fn unfinished(
        endpoint: Endpoint,
        record: ContentRecord,
        elapsed: Duration,
        error: OutcomeError,
    ) -> Self {
        Self {
            endpoint,
            record,
            elapsed,
            attempts_used: 0,
            digest_matched: false,
            error: Some(error),
            secondary: None,
        }
    }
}
