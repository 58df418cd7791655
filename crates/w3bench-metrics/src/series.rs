use prometheus::{GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use w3bench_race::RetrievalOutcome;

use crate::error::Result;

/// Label names shared by every series.
pub const LABELS: [&str; 6] = ["storage", "server", "attempts", "latitude", "longitude", "size"];

/// Sub-second to half an hour.
pub const LATENCY_BUCKETS: [f64; 15] = [
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0,
];

/// Label values describing one outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeLabels {
    pub storage: String,
    pub server: String,
    pub attempts: String,
    pub latitude: String,
    pub longitude: String,
    pub size: String,
}

impl OutcomeLabels {
    pub fn of(outcome: &RetrievalOutcome) -> Self {
        let (latitude, longitude) = match &outcome.endpoint.location {
            Some(location) => (location.latitude.to_string(), location.longitude.to_string()),
            None => ("unknown".to_string(), "unknown".to_string()),
        };
        Self {
            storage: outcome.record.backend.key().to_string(),
            server: outcome.endpoint.to_string(),
            attempts: outcome.attempts_used.to_string(),
            latitude,
            longitude,
            size: outcome.record.size_kb.to_string(),
        }
    }

    pub fn values(&self) -> [&str; 6] {
        [
            self.storage.as_str(),
            self.server.as_str(),
            self.attempts.as_str(),
            self.latitude.as_str(),
            self.longitude.as_str(),
            self.size.as_str(),
        ]
    }

    fn with<'a>(&'a self, extra: &'a str) -> [&'a str; 7] {
        let [a, b, c, d, e, f] = self.values();
        [a, b, c, d, e, f, extra]
    }
}

/// The series of one namespace, registered under `{prefix}_*`.
#[derive(Clone)]
pub struct Series {
    pub retrievals: IntCounterVec,
    pub sha_fail: IntCounterVec,
    pub sha_fail_secondary: IntCounterVec,
    pub download_time: GaugeVec,
    pub download_seconds: HistogramVec,
    pub download_extremes: GaugeVec,
    pub download_secondary: GaugeVec,
}

impl Series {
    pub fn register(prefix: &str, registry: &Registry) -> Result<Self> {
        let with_status = [&LABELS[..], &["status"][..]].concat();
        let with_extreme = [&LABELS[..], &["extreme"][..]].concat();

        let series = Self {
            retrievals: IntCounterVec::new(
                Opts::new(format!("{prefix}_retrievals_total"), "Retrieval outcomes by final status"),
                &with_status,
            )?,
            sha_fail: IntCounterVec::new(
                Opts::new(format!("{prefix}_sha_fail"), "Retrievals that never produced the expected digest"),
                &LABELS,
            )?,
            sha_fail_secondary: IntCounterVec::new(
                Opts::new(
                    format!("{prefix}_sha_fail_secondary"),
                    "Secondary reads whose digest differed from the verified content",
                ),
                &LABELS,
            )?,
            download_time: GaugeVec::new(
                Opts::new(format!("{prefix}_download_time"), "Seconds until the first verified retrieval"),
                &LABELS,
            )?,
            download_seconds: HistogramVec::new(
                HistogramOpts::new(format!("{prefix}_download_seconds"), "Verified retrieval latency")
                    .buckets(LATENCY_BUCKETS.to_vec()),
                &LABELS,
            )?,
            download_extremes: GaugeVec::new(
                Opts::new(format!("{prefix}_download_extremes"), "Fastest and slowest verified retrieval of a race"),
                &with_extreme,
            )?,
            download_secondary: GaugeVec::new(
                Opts::new(format!("{prefix}_download_secondary"), "Seconds taken by the secondary read"),
                &LABELS,
            )?,
        };

        registry.register(Box::new(series.retrievals.clone()))?;
        registry.register(Box::new(series.sha_fail.clone()))?;
        registry.register(Box::new(series.sha_fail_secondary.clone()))?;
        registry.register(Box::new(series.download_time.clone()))?;
        registry.register(Box::new(series.download_seconds.clone()))?;
        registry.register(Box::new(series.download_extremes.clone()))?;
        registry.register(Box::new(series.download_secondary.clone()))?;
        Ok(series)
    }

    pub fn record(&self, outcome: &RetrievalOutcome) {
        let labels = OutcomeLabels::of(outcome);
        let values = labels.values();

        let status = match outcome.error {
            _ if outcome.digest_matched => "ok".to_string(),
            Some(error) => error.to_string(),
            None => "integrity".to_string(),
        };
        self.retrievals.with_label_values(&labels.with(&status)).inc();

        if outcome.digest_matched {
            let seconds = outcome.elapsed.as_secs_f64();
            self.download_time.with_label_values(&values).set(seconds);
            self.download_seconds.with_label_values(&values).observe(seconds);
        } else {
            self.sha_fail.with_label_values(&values).inc();
        }

        if let Some(secondary) = outcome.secondary {
            self.download_secondary
                .with_label_values(&values)
                .set(secondary.elapsed.as_secs_f64());
            if !secondary.matched {
                self.sha_fail_secondary.with_label_values(&values).inc();
            }
        }
    }

    pub fn record_extreme(&self, extreme: &str, outcome: &RetrievalOutcome) {
        let labels = OutcomeLabels::of(outcome);
        self.download_extremes
            .with_label_values(&labels.with(extreme))
            .set(outcome.elapsed.as_secs_f64());
    }
}
