//! Concurrent fan-out of one record over many endpoints.

use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::task::AbortHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{error, info, warn};

use crate::data::{ContentRecord, Endpoint, OutcomeError, RaceOptions, RaceResult, RetrievalOutcome};
use crate::driver;
use crate::effects::Retrieve;

/// Runs one retry driver per endpoint and collects every outcome.
pub struct RaceCoordinator<C> {
    client: Arc<C>,
    options: RaceOptions,
}

impl<C: Retrieve + 'static> RaceCoordinator<C> {
    pub fn new(client: C, options: RaceOptions) -> Self { Self::with_shared(Arc::new(client), options) }

    pub fn with_shared(client: Arc<C>, options: RaceOptions) -> Self { Self { client, options } }

    pub fn options(&self) -> &RaceOptions { &self.options }

    /// Race `record` over `endpoints`.
    ///
    /// The result holds exactly one outcome per endpoint, in completion order.
    /// A failing or panicking endpoint never affects its siblings. When the
    /// race deadline passes, endpoints still running are aborted and reported
    /// as cancelled; finished outcomes are kept as they are.
    pub async fn race(&self, record: &ContentRecord, endpoints: &[Endpoint]) -> RaceResult {
        let started = Instant::now();
        let deadline = self.options.race_timeout.map(|limit| started + limit);

        let mut aborts: Vec<AbortHandle> = Vec::with_capacity(endpoints.len());
        let mut pending = FuturesUnordered::new();
        for (index, endpoint) in endpoints.iter().enumerate() {
            let client = Arc::clone(&self.client);
            let endpoint = endpoint.clone();
            let record = record.clone();
            let policy = self.options.policy_for(endpoint.transport).clone();

            let handle = tokio::spawn(async move { driver::run(&*client, &endpoint, &record, &policy).await });
            aborts.push(handle.abort_handle());
            pending.push(async move { (index, handle.await) });
        }

        let mut finished = vec![false; endpoints.len()];
        let mut outcomes = Vec::with_capacity(endpoints.len());
        loop {
            let next = match deadline {
                Some(deadline) => match timeout_at(deadline, pending.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(locator = %record.locator, "race deadline reached");
                        break;
                    }
                },
                None => pending.next().await,
            };
            let Some((index, joined)) = next else { break };

            finished[index] = true;
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(endpoint = %endpoints[index], error = %e, "retrieval task aborted");
                    outcomes.push(RetrievalOutcome::unfinished(
                        endpoints[index].clone(),
                        record.clone(),
                        started.elapsed(),
                        OutcomeError::Aborted,
                    ));
                }
            }
        }

        for (index, _) in finished.iter().enumerate().filter(|(_, done)| !**done) {
            aborts[index].abort();
            outcomes.push(RetrievalOutcome::unfinished(
                endpoints[index].clone(),
                record.clone(),
                started.elapsed(),
                OutcomeError::Cancelled,
            ));
        }

        let result = RaceResult::new(record.clone(), outcomes);
        info!(
            backend = %record.backend,
            locator = %record.locator,
            endpoints = endpoints.len(),
            failures = result.failures(),
            elapsed = ?started.elapsed(),
            "race finished"
        );
        result
    }
}
