use std::fmt;
use std::future::Future;

use bytes::Bytes;
use tracing::debug;

use super::{Payload, Retrieve};
use crate::core::parse_locator;
use crate::data::Endpoint;
use crate::error::TransportError;

/// Asynchronous HTTP GET abstraction.
///
/// Implementations follow redirects themselves and map any non-2xx status
/// to [`TransportError::Status`].
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> impl Future<Output = Result<Bytes, TransportError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn other(self) -> Self {
        match self {
            Scheme::Http => Scheme::Https,
            Scheme::Https => Scheme::Http,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            _ => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => f.write_str("http"),
            Scheme::Https => f.write_str("https"),
        }
    }
}

/// Failures that suggest the endpoint speaks the other scheme.
fn wrong_scheme(err: &TransportError) -> bool {
    matches!(
        err,
        TransportError::Tls(_) | TransportError::Protocol(_) | TransportError::Connect(_) | TransportError::Status(400 | 426)
    )
}

/// GET `{scheme}://{host}[:port]/{prefix}/{locator}` against a gateway.
///
/// A scheme given in the endpoint address becomes the primary scheme. When
/// the primary scheme fails in a way that points at a scheme mismatch, the
/// other scheme is tried within the same attempt.
pub struct DirectHttp<H> {
    client: H,
    primary: Scheme,
    fallback: bool,
}

impl<H: HttpClient> DirectHttp<H> {
    pub fn new(client: H) -> Self {
        Self {
            client,
            primary: Scheme::Http,
            fallback: true,
        }
    }

    #[must_use]
    pub fn primary(mut self, scheme: Scheme) -> Self {
        self.primary = scheme;
        self
    }

    #[must_use]
    pub fn fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    fn url(scheme: Scheme, authority: &str, endpoint: &Endpoint, locator: &str) -> String {
        format!("{scheme}://{authority}/{}/{locator}", endpoint.backend.path_prefix())
    }
}

impl<H: HttpClient> Retrieve for DirectHttp<H> {
    async fn attempt(&self, endpoint: &Endpoint, locator: &str) -> Result<Payload, TransportError> {
        let target = parse_locator(&endpoint.address).map_err(|e| TransportError::Connect(e.to_string()))?;
        let primary = target.scheme.as_deref().and_then(Scheme::parse).unwrap_or(self.primary);
        let authority = target.authority();

        let first = self.client.get(&Self::url(primary, &authority, endpoint, locator)).await;
        let body = match first {
            Err(err) if self.fallback && wrong_scheme(&err) => {
                debug!(endpoint = %endpoint, error = %err, "{primary} failed, retrying over {}", primary.other());
                self.client.get(&Self::url(primary.other(), &authority, endpoint, locator)).await?
            }
            other => other?,
        };

        Ok(Payload::Bytes(body))
    }
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use std::error::Error as _;
    use std::time::Duration;

    use super::*;

    /// Production HTTP client implementation using reqwest.
    #[derive(Clone)]
    pub struct ReqwestClient {
        client: reqwest::Client,
        connect_timeout: Duration,
    }

    impl ReqwestClient {
        pub fn new(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
            let client = reqwest::Client::builder().connect_timeout(connect_timeout).build()?;
            Ok(Self { client, connect_timeout })
        }

        fn map_error(&self, e: reqwest::Error) -> TransportError {
            if e.is_timeout() {
                return TransportError::Timeout(self.connect_timeout);
            }
            if let Some(status) = e.status() {
                return TransportError::Status(status.as_u16());
            }

            let mut source = e.source();
            while let Some(err) = source {
                let msg = err.to_string().to_ascii_lowercase();
                if msg.contains("tls") || msg.contains("certificate") || msg.contains("ssl") {
                    return TransportError::Tls(e.to_string());
                }
                source = err.source();
            }

            if e.is_connect() {
                TransportError::Connect(e.to_string())
            } else {
                TransportError::Protocol(e.to_string())
            }
        }
    }

    impl HttpClient for ReqwestClient {
        async fn get(&self, url: &str) -> Result<Bytes, TransportError> {
            let response = self.client.get(url).send().await.map_err(|e| self.map_error(e))?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }
            response.bytes().await.map_err(|e| self.map_error(e))
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;
