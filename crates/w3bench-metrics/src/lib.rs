//! Prometheus series for retrieval races, pushed to a gateway.
//!
//! Two namespaces share one registry: `util_web3_storage_*` for upload and
//! gateway-check runs, `util_web3_storage_repeat_*` for download-verify runs.
//! Every series carries the labels in [`LABELS`].

mod emitter;
mod error;
mod series;

pub use emitter::{MetricsEmitter, Namespace, PushTarget};
pub use error::{MetricsError, Result};
pub use series::{LABELS, LATENCY_BUCKETS, OutcomeLabels, Series};
