//! Error types for w3bench-race.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failure of a single retrieval attempt.
///
/// Every variant is retryable: the retry driver records it and moves on to
/// the next attempt. [`TransportError::Timeout`] is kept separate so outcomes
/// can tell a hung endpoint from a refusing one.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("TLS failure: {0}")]
    Tls(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("authentication failed for {host}")]
    Auth { host: String },

    #[error("remote command exited with status {status}: {stderr}")]
    RemoteExit { status: i32, stderr: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool { matches!(self, TransportError::Timeout(_)) }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot resolve '{locator}': {reason}")]
    Resolution { locator: String, reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
