use std::collections::HashMap;

use prometheus::{BasicAuthentication, Encoder, Registry, TextEncoder};
use tracing::{debug, warn};
use w3bench_race::{RaceResult, RetrievalOutcome};

use crate::error::Result;
use crate::series::Series;

/// Which series an emission lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Upload and gateway-check runs.
    Primary,
    /// Download-verify runs over previously published content.
    Repeat,
}

/// Push-gateway destination.
#[derive(Debug, Clone)]
pub struct PushTarget {
    pub url: String,
    pub job: String,
    pub username: String,
    pub password: String,
}

/// Maps race outcomes onto Prometheus series and pushes them.
///
/// Emission only touches in-memory series. Nothing leaves the process until
/// [`flush`](MetricsEmitter::flush), and a failed push is logged, never
/// returned to the benchmark.
pub struct MetricsEmitter {
    registry: Registry,
    primary: Series,
    repeat: Series,
    target: Option<PushTarget>,
}

impl MetricsEmitter {
    pub const PRIMARY_PREFIX: &'static str = "util_web3_storage";
    pub const REPEAT_PREFIX: &'static str = "util_web3_storage_repeat";

    pub fn new(target: Option<PushTarget>) -> Result<Self> {
        let registry = Registry::new();
        let primary = Series::register(Self::PRIMARY_PREFIX, &registry)?;
        let repeat = Series::register(Self::REPEAT_PREFIX, &registry)?;
        Ok(Self {
            registry,
            primary,
            repeat,
            target,
        })
    }

    pub fn registry(&self) -> &Registry { &self.registry }

    pub fn series(&self, namespace: Namespace) -> &Series {
        match namespace {
            Namespace::Primary => &self.primary,
            Namespace::Repeat => &self.repeat,
        }
    }

    pub fn emit(&self, namespace: Namespace, outcome: &RetrievalOutcome) { self.series(namespace).record(outcome); }

    /// Per-outcome series for every outcome plus the race's extremes.
    pub fn emit_race(&self, namespace: Namespace, race: &RaceResult) {
        for outcome in &race.outcomes {
            self.emit(namespace, outcome);
        }
        self.emit_summary(namespace, race);
    }

    /// Fastest and slowest verified latency of the race, if any matched.
    pub fn emit_summary(&self, namespace: Namespace, race: &RaceResult) {
        let series = self.series(namespace);
        if let Some(fastest) = race.fastest() {
            series.record_extreme("fastest", fastest);
        }
        if let Some(slowest) = race.slowest() {
            series.record_extreme("slowest", slowest);
        }
    }

    /// Text exposition of every registered series.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Push the current state of every series to the gateway.
    ///
    /// The prometheus push client blocks, so it runs on the blocking pool.
    pub async fn push(&self) -> Result<()> {
        let Some(target) = self.target.clone() else {
            debug!("no push gateway configured");
            return Ok(());
        };
        let families = self.registry.gather();

        tokio::task::spawn_blocking(move || {
            prometheus::push_metrics(
                &target.job,
                HashMap::new(),
                &target.url,
                families,
                Some(BasicAuthentication {
                    username: target.username,
                    password: target.password,
                }),
            )
        })
        .await??;
        Ok(())
    }

    /// [`push`](Self::push), logging instead of returning a failure.
    pub async fn flush(&self) {
        match self.push().await {
            Ok(()) => debug!("metrics pushed"),
            Err(e) => warn!(error = %e, "failed to push metrics"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use w3bench_race::{Backend, ContentRecord, Endpoint, Location, OutcomeError, SecondaryRead};
    use w3bench_verify::digest;

    use super::*;
    use crate::series::OutcomeLabels;

    fn outcome(address: &str, matched: bool, secs: f64) -> RetrievalOutcome {
        RetrievalOutcome {
            endpoint: Endpoint::http(Backend::Swarm, address).with_location(Some(Location {
                latitude: 52.52,
                longitude: 13.405,
                city: "Berlin".into(),
            })),
            record: ContentRecord::new(Backend::Swarm, 100, "ref", digest(b"abc")),
            elapsed: Duration::from_secs_f64(secs),
            attempts_used: 2,
            digest_matched: matched,
            error: (!matched).then_some(OutcomeError::Integrity),
            secondary: None,
        }
    }

    fn with_status(labels: &OutcomeLabels, status: &str) -> Vec<String> {
        labels.values().iter().map(|v| v.to_string()).chain([status.to_string()]).collect()
    }

    fn refs(values: &[String]) -> Vec<&str> { values.iter().map(String::as_str).collect() }

    #[test]
    fn test_labels() {
        let labels = OutcomeLabels::of(&outcome("gw", true, 1.0));
        assert_eq!(labels.values(), ["swarm", "http:gw", "2", "52.52", "13.405", "100"]);

        let mut unlocated = outcome("gw", true, 1.0);
        unlocated.endpoint.location = None;
        let labels = OutcomeLabels::of(&unlocated);
        assert_eq!(labels.latitude, "unknown");
        assert_eq!(labels.longitude, "unknown");
    }

    #[test]
    fn test_emit_success_and_failure() {
        let metrics = MetricsEmitter::new(None).unwrap();
        let ok = outcome("a", true, 2.5);
        let bad = outcome("b", false, 9.0);
        metrics.emit(Namespace::Primary, &ok);
        metrics.emit(Namespace::Primary, &bad);

        let series = metrics.series(Namespace::Primary);
        let ok_labels = OutcomeLabels::of(&ok);
        let bad_labels = OutcomeLabels::of(&bad);

        assert_eq!(series.retrievals.with_label_values(&refs(&with_status(&ok_labels, "ok"))).get(), 1);
        assert_eq!(series.retrievals.with_label_values(&refs(&with_status(&bad_labels, "integrity"))).get(), 1);
        assert_eq!(series.download_time.with_label_values(&ok_labels.values()).get(), 2.5);
        assert_eq!(series.download_seconds.with_label_values(&ok_labels.values()).get_sample_count(), 1);
        assert_eq!(series.sha_fail.with_label_values(&bad_labels.values()).get(), 1);
        assert_eq!(series.sha_fail.with_label_values(&ok_labels.values()).get(), 0);

        // nothing in the other namespace
        let repeat = metrics.series(Namespace::Repeat);
        assert_eq!(repeat.sha_fail.with_label_values(&bad_labels.values()).get(), 0);
    }

    #[test]
    fn test_secondary_mismatch_counted() {
        let metrics = MetricsEmitter::new(None).unwrap();
        let mut o = outcome("a", true, 1.0);
        o.secondary = Some(SecondaryRead {
            elapsed: Duration::from_millis(400),
            matched: false,
        });
        metrics.emit(Namespace::Repeat, &o);

        let series = metrics.series(Namespace::Repeat);
        let labels = OutcomeLabels::of(&o);
        assert_eq!(series.download_secondary.with_label_values(&labels.values()).get(), 0.4);
        assert_eq!(series.sha_fail_secondary.with_label_values(&labels.values()).get(), 1);
        assert_eq!(series.sha_fail.with_label_values(&labels.values()).get(), 0);
    }

    #[test]
    fn test_summary_extremes() {
        let metrics = MetricsEmitter::new(None).unwrap();
        let race = RaceResult::new(ContentRecord::new(Backend::Swarm, 100, "ref", digest(b"abc")), vec![
            outcome("a", true, 2.0),
            outcome("b", false, 0.5),
            outcome("c", true, 5.0),
        ]);
        metrics.emit_race(Namespace::Primary, &race);

        let series = metrics.series(Namespace::Primary);
        let fastest = with_status(&OutcomeLabels::of(&race.outcomes[0]), "fastest");
        let slowest = with_status(&OutcomeLabels::of(&race.outcomes[2]), "slowest");
        assert_eq!(series.download_extremes.with_label_values(&refs(&fastest)).get(), 2.0);
        assert_eq!(series.download_extremes.with_label_values(&refs(&slowest)).get(), 5.0);
    }

    #[test]
    fn test_render_uses_both_prefixes() {
        let metrics = MetricsEmitter::new(None).unwrap();
        metrics.emit(Namespace::Primary, &outcome("a", false, 1.0));
        metrics.emit(Namespace::Repeat, &outcome("a", false, 1.0));

        let text = metrics.render().unwrap();
        assert!(text.contains("util_web3_storage_sha_fail{"));
        assert!(text.contains("util_web3_storage_repeat_sha_fail{"));
        assert!(text.contains("util_web3_storage_retrievals_total{"));
    }

    #[tokio::test]
    async fn test_flush_without_target_is_noop() {
        let metrics = MetricsEmitter::new(None).unwrap();
        metrics.emit(Namespace::Primary, &outcome("a", true, 1.0));
        assert!(metrics.push().await.is_ok());
        metrics.flush().await;
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_an_error_not_a_panic() {
        let metrics = MetricsEmitter::new(Some(PushTarget {
            url: "http://127.0.0.1:1".into(),
            job: "web3storage_speed_test".into(),
            username: "user".into(),
            password: "pw".into(),
        }))
        .unwrap();
        metrics.emit(Namespace::Primary, &outcome("a", true, 1.0));

        assert!(metrics.push().await.is_err());
        metrics.flush().await;
    }
}
