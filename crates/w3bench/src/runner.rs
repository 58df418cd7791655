use std::sync::Arc;

use tracing::{debug, error, info, warn};
use w3bench_metrics::{MetricsEmitter, Namespace};
use w3bench_race::{Backend, ContentRecord, RaceCoordinator, RaceResult, Retrieve, RetrievalOutcome};
use w3bench_store::ReferenceStore;
use w3bench_verify::digest;

use crate::cli::RunArgs;
use crate::payload::random_json;
use crate::topology::Topology;
use crate::upload::Publisher;

pub enum Mode {
    /// Publish a fresh payload each round, then race it.
    Upload { publisher: Publisher, size_kb: u32 },
    /// Race the latest record of each backend and size class.
    Check,
    /// Race every stored record.
    Download,
}

pub struct Runner<C> {
    coordinator: RaceCoordinator<C>,
    metrics: Arc<MetricsEmitter>,
    topology: Topology,
}

impl<C: Retrieve + 'static> Runner<C> {
    pub fn new(coordinator: RaceCoordinator<C>, metrics: Arc<MetricsEmitter>, topology: Topology) -> Self {
        Self {
            coordinator,
            metrics,
            topology,
        }
    }

    /// `repeat` rounds per cycle; metrics are pushed after every race and
    /// again at the end of each cycle. With `continuous` cycles never end.
    pub async fn run(&self, mode: &Mode, args: &RunArgs, store: &mut ReferenceStore) -> anyhow::Result<()> {
        loop {
            for round in 1..=args.repeat.max(1) {
                debug!(round, repeat = args.repeat, "round started");
                match mode {
                    Mode::Upload { publisher, size_kb } => self.upload_round(publisher, *size_kb, store).await?,
                    Mode::Check => self.race_all(Namespace::Primary, store.latest()).await,
                    Mode::Download => self.race_all(Namespace::Repeat, store.records()).await,
                }
            }

            self.metrics.flush().await;
            info!("all repeats done");
            if !args.continuous {
                return Ok(());
            }
        }
    }

    async fn upload_round(&self, publisher: &Publisher, size_kb: u32, store: &mut ReferenceStore) -> anyhow::Result<()> {
        let payload = random_json(&mut rand::thread_rng(), size_kb);
        let expected = digest(payload.as_bytes());
        info!(size_kb, %expected, "generated payload");

        let mut published = Vec::new();
        for backend in Backend::ALL {
            match publisher.publish(backend, size_kb, &payload, expected).await {
                Ok(record) => {
                    store.append(&record);
                    store.save()?;
                    published.push(record);
                }
                Err(e) => error!(%backend, error = %format!("{e:#}"), "upload failed"),
            }
        }

        self.race_all(Namespace::Primary, published).await;
        Ok(())
    }

    async fn race_all(&self, namespace: Namespace, records: Vec<ContentRecord>) {
        if records.is_empty() {
            warn!("no records to race");
        }
        for record in records {
            self.race(namespace, &record).await;
        }
    }

    pub async fn race(&self, namespace: Namespace, record: &ContentRecord) -> RaceResult {
        let endpoints = self.topology.for_backend(record.backend);
        if endpoints.is_empty() {
            warn!(backend = %record.backend, "no endpoints configured");
        }

        let race = self.coordinator.race(record, endpoints).await;
        for outcome in &race.outcomes {
            log_outcome(outcome);
        }
        log_summary(&race);

        self.metrics.emit_race(namespace, &race);
        self.metrics.flush().await;
        race
    }
}

fn log_outcome(outcome: &RetrievalOutcome) {
    let endpoint = &outcome.endpoint;
    if outcome.digest_matched {
        info!(
            %endpoint,
            city = endpoint.city(),
            size_kb = outcome.record.size_kb,
            elapsed = ?outcome.elapsed,
            attempts = outcome.attempts_used,
            secondary = ?outcome.secondary.map(|s| s.elapsed),
            "digest matches"
        );
    } else {
        warn!(
            %endpoint,
            city = endpoint.city(),
            size_kb = outcome.record.size_kb,
            elapsed = ?outcome.elapsed,
            attempts = outcome.attempts_used,
            error = ?outcome.error,
            "digest does NOT match"
        );
    }
}

fn log_summary(race: &RaceResult) {
    let locator = &race.record.locator;
    match (race.fastest(), race.slowest()) {
        (Some(fastest), Some(slowest)) => info!(
            %locator,
            fastest = %fastest.endpoint,
            fastest_elapsed = ?fastest.elapsed,
            slowest = %slowest.endpoint,
            slowest_elapsed = ?slowest.elapsed,
            failures = race.failures(),
            "race summary"
        ),
        _ => warn!(%locator, failures = race.failures(), "no endpoint produced verified content"),
    }
    if let Some((fastest, slowest)) = race.secondary_extremes() {
        info!(
            %locator,
            fastest = %fastest.endpoint,
            fastest_elapsed = ?fastest.secondary.map(|s| s.elapsed),
            slowest = %slowest.endpoint,
            slowest_elapsed = ?slowest.secondary.map(|s| s.elapsed),
            "secondary read summary"
        );
    }
}
