use std::fmt;
use std::net::IpAddr;

use tracing::debug;

use crate::core::{Target, parse_locator};
use crate::data::Location;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The locator already was an IP address.
    Literal(IpAddr),
    /// Forward DNS lookup result.
    Dns(IpAddr),
    /// Lookup failed; retrieval still goes by the name as given.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub target: Target,
    pub resolution: Resolution,
}

impl Resolved {
    pub fn ip(&self) -> Option<IpAddr> {
        match self.resolution {
            Resolution::Literal(ip) | Resolution::Dns(ip) => Some(ip),
            Resolution::Unknown => None,
        }
    }
}

impl fmt::Display for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip() {
            Some(ip) => write!(f, "{ip}"),
            None => f.write_str("unknown"),
        }
    }
}

/// Resolve a locator to an address, best effort.
///
/// Only a malformed locator is an error. A failed DNS lookup yields
/// [`Resolution::Unknown`].
pub async fn resolve(locator: &str) -> Result<Resolved> {
    let target = parse_locator(locator)?;
    if let Some(ip) = target.ip_literal() {
        return Ok(Resolved { target, resolution: Resolution::Literal(ip) });
    }

    let resolution = match tokio::net::lookup_host((target.host.as_str(), target.port.unwrap_or(0))).await {
        Ok(addrs) => {
            let addrs: Vec<_> = addrs.map(|a| a.ip()).collect();
            addrs
                .iter()
                .find(|ip| ip.is_ipv4())
                .or(addrs.first())
                .map_or(Resolution::Unknown, |ip| Resolution::Dns(*ip))
        }
        Err(e) => {
            debug!(host = %target.host, error = %e, "DNS lookup failed");
            Resolution::Unknown
        }
    };

    Ok(Resolved { target, resolution })
}

/// Extract a [`Location`] from an ipinfo.io response body.
///
/// Responses without a `loc` field (bogon or reserved addresses) yield `None`.
pub fn parse_ipinfo(body: &serde_json::Value) -> Option<Location> {
    let (lat, lon) = body.get("loc")?.as_str()?.split_once(',')?;
    Some(Location {
        latitude: lat.trim().parse().ok()?,
        longitude: lon.trim().parse().ok()?,
        city: body.get("city").and_then(|c| c.as_str()).unwrap_or("unknown").to_string(),
    })
}

#[cfg(feature = "reqwest")]
mod geo {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use tracing::warn;

    use super::*;

    /// Approximate origin of an IP via the ipinfo.io API, cached per address.
    pub struct GeoLocator {
        client: reqwest::Client,
        base_url: String,
        token: Option<String>,
        cache: Mutex<HashMap<IpAddr, Option<Location>>>,
    }

    impl GeoLocator {
        pub fn new(token: Option<String>) -> std::result::Result<Self, reqwest::Error> {
            let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
            Ok(Self {
                client,
                base_url: "https://ipinfo.io".to_string(),
                token,
                cache: Mutex::new(HashMap::new()),
            })
        }

        #[must_use]
        pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
            self.base_url = base_url.into();
            self
        }

        /// Location of `ip`, or `None` when it cannot be determined.
        pub async fn locate(&self, ip: IpAddr) -> Option<Location> {
            if let Some(hit) = self.cache.lock().ok().and_then(|c| c.get(&ip).cloned()) {
                return hit;
            }

            let mut request = self.client.get(format!("{}/{ip}/json", self.base_url));
            if let Some(token) = &self.token {
                request = request.query(&[("token", token)]);
            }
            let location = match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(response) => response.json::<serde_json::Value>().await.ok().and_then(|b| parse_ipinfo(&b)),
                Err(e) => {
                    warn!(%ip, error = %e, "geolocation lookup failed");
                    None
                }
            };

            if let Ok(mut cache) = self.cache.lock() {
                cache.insert(ip, location.clone());
            }
            location
        }

        /// Resolve `address` and locate it; every failure degrades to `None`.
        pub async fn locate_address(&self, address: &str) -> Option<Location> {
            match resolve(address).await {
                Ok(resolved) => match resolved.ip() {
                    Some(ip) => self.locate(ip).await,
                    None => None,
                },
                Err(e) => {
                    warn!(address, error = %e, "cannot resolve endpoint address");
                    None
                }
            }
        }
    }
}

#[cfg(feature = "reqwest")]
pub use geo::GeoLocator;
