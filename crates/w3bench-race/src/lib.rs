//! Concurrent retrieval of published content from many endpoints, with
//! bounded retry and digest verification.
//!
//! # Architecture
//!
//! - [`data`] - records, endpoints, outcomes and policies
//! - [`core`] - pure transformations: backoff, locator parsing, extremes
//! - [`effects`] - transports behind the [`Retrieve`] trait, name resolution
//!
//! On top of these, [`driver::run`] retries one endpoint until the digest
//! matches, and [`RaceCoordinator`] runs one driver per endpoint concurrently.
//!
//! # Example
//!
//! ```no_run
//! use w3bench_race::{Backend, ContentRecord, DirectHttp, Endpoint, RaceCoordinator, RaceOptions, ReqwestClient};
//! use w3bench_verify::Sha256Hash;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = DirectHttp::new(ReqwestClient::new(std::time::Duration::from_secs(10))?);
//! let coordinator = RaceCoordinator::new(client, RaceOptions::default());
//!
//! let digest: Sha256Hash = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".parse()?;
//! let record = ContentRecord::new(Backend::Swarm, 1, "c0ffee", digest);
//! let race = coordinator
//!     .race(&record, &[Endpoint::http(Backend::Swarm, "gateway.example.org")])
//!     .await;
//! println!("fastest: {:?}", race.fastest().map(|o| o.elapsed));
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod data;
pub mod driver;
pub mod effects;
mod error;
mod race;

pub use data::{
    Backend, ContentRecord, Endpoint, Location, OutcomeError, RaceOptions, RaceResult, RetrievalOutcome,
    RetryPolicy, SecondaryRead, Transport,
};
pub use effects::{
    DirectHttp, HttpClient, Payload, PendingCleanups, RemoteShell, Resolution, Resolved, Retrieve, Retrievers,
    Scheme, ShellHttp, ShellOutput, ShellTool, SshShell, ToolSpec, discover_target, resolve,
};
pub use error::{Error, Result, TransportError};
pub use race::RaceCoordinator;

#[cfg(feature = "reqwest")]
pub use effects::{GeoLocator, ReqwestClient};
