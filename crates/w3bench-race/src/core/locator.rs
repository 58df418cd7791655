use std::fmt;
use std::net::IpAddr;

use crate::error::{Error, Result};

/// A network locator split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl Target {
    /// `host[:port]`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') { format!("[{}]", self.host) } else { self.host.clone() };
        match self.port {
            Some(port) => format!("{host}:{port}"),
            None => host,
        }
    }

    pub fn ip_literal(&self) -> Option<IpAddr> { self.host.parse().ok() }

    #[must_use]
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.port.get_or_insert(port);
        self
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{scheme}://")?;
        }
        f.write_str(&self.authority())
    }
}

/// Split `[scheme://]host[:port][/path]` into a [`Target`].
///
/// Any path is dropped. Unbracketed IPv6 literals are accepted without a port.
///
/// # Examples
///
/// ```
/// use w3bench_race::core::parse_locator;
///
/// let target = parse_locator("https://gateway.example.org:8443/bzz").unwrap();
/// assert_eq!(target.scheme.as_deref(), Some("https"));
/// assert_eq!(target.host, "gateway.example.org");
/// assert_eq!(target.port, Some(8443));
/// ```
pub fn parse_locator(locator: &str) -> Result<Target> {
    let fail = |reason: &str| Error::Resolution {
        locator: locator.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = locator.trim();
    let (scheme, rest) = match trimmed.split_once("://") {
        Some((scheme, rest)) => (Some(scheme.to_ascii_lowercase()), rest),
        None => (None, trimmed),
    };
    let authority = rest.split('/').next().unwrap_or_default();

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, tail) = bracketed.split_once(']').ok_or_else(|| fail("unclosed '['"))?;
        match tail.strip_prefix(':') {
            Some(port) => (host, Some(port)),
            None if tail.is_empty() => (host, None),
            None => return Err(fail("unexpected characters after ']'")),
        }
    } else if authority.matches(':').count() == 1 {
        let (host, port) = authority.split_once(':').unwrap_or((authority, ""));
        (host, Some(port))
    } else {
        (authority, None)
    };

    if host.is_empty() {
        return Err(fail("empty host"));
    }
    let port = port
        .map(|p| p.parse::<u16>().map_err(|_| fail("invalid port")))
        .transpose()?;

    Ok(Target {
        scheme,
        host: host.to_string(),
        port,
    })
}
