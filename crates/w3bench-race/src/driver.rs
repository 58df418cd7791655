//! Per-endpoint retry loop.

use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::core::retry_delay;
use crate::data::{ContentRecord, Endpoint, OutcomeError, RetrievalOutcome, RetryPolicy, SecondaryRead};
use crate::effects::{Payload, Retrieve};
use crate::error::TransportError;

/// Retrieve `record` through `endpoint` until the digest matches or the
/// policy's attempts run out.
///
/// Never fails: every transport error, timeout and mismatch is contained in
/// the returned outcome. Attempts are strictly sequential and elapsed time
/// counts from the start of the first one.
pub async fn run<C: Retrieve + ?Sized>(
    client: &C,
    endpoint: &Endpoint,
    record: &ContentRecord,
    policy: &RetryPolicy,
) -> RetrievalOutcome {
    let max_attempts = policy.attempts();
    let started = Instant::now();
    let mut last_error = OutcomeError::Transport;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            sleep(retry_delay(attempt - 2, policy.retry_backoff, policy.max_backoff)).await;
        }

        match verified_attempt(client, endpoint, record, policy).await {
            Ok(()) => {
                let elapsed = started.elapsed();
                info!(%endpoint, attempt, ?elapsed, "retrieved and verified");

                let secondary = if policy.secondary_read {
                    Some(secondary_read(client, endpoint, record, policy).await)
                } else {
                    None
                };

                return RetrievalOutcome {
                    endpoint: endpoint.clone(),
                    record: record.clone(),
                    elapsed,
                    attempts_used: attempt,
                    digest_matched: true,
                    error: None,
                    secondary,
                };
            }
            Err(kind) => {
                debug!(%endpoint, attempt, max_attempts, error = %kind, "attempt failed");
                last_error = kind;
            }
        }
    }

    let elapsed = started.elapsed();
    warn!(%endpoint, locator = %record.locator, attempts = max_attempts, ?elapsed, error = %last_error, "no verified retrieval");

    RetrievalOutcome {
        endpoint: endpoint.clone(),
        record: record.clone(),
        elapsed,
        attempts_used: max_attempts,
        digest_matched: false,
        error: Some(last_error),
        secondary: None,
    }
}

async fn bounded_attempt<C: Retrieve + ?Sized>(
    client: &C,
    endpoint: &Endpoint,
    locator: &str,
    policy: &RetryPolicy,
) -> Result<Payload, TransportError> {
    match policy.attempt_timeout {
        Some(limit) => timeout(limit, client.attempt(endpoint, locator))
            .await
            .unwrap_or(Err(TransportError::Timeout(limit))),
        None => client.attempt(endpoint, locator).await,
    }
}

async fn verified_attempt<C: Retrieve + ?Sized>(
    client: &C,
    endpoint: &Endpoint,
    record: &ContentRecord,
    policy: &RetryPolicy,
) -> Result<(), OutcomeError> {
    match bounded_attempt(client, endpoint, &record.locator, policy).await {
        Ok(payload) => {
            let actual = payload.digest();
            if actual == record.expected_digest {
                Ok(())
            } else {
                warn!(%endpoint, expected = %record.expected_digest, %actual, "digest mismatch");
                Err(OutcomeError::Integrity)
            }
        }
        Err(e) if e.is_timeout() => {
            warn!(%endpoint, error = %e, "attempt timed out");
            Err(OutcomeError::Timeout)
        }
        Err(e) => {
            warn!(%endpoint, error = %e, "transport error");
            Err(OutcomeError::Transport)
        }
    }
}

/// A second read right after a match. A mismatch here means the content
/// changed between reads; it is logged and never overrides the primary result.
async fn secondary_read<C: Retrieve + ?Sized>(
    client: &C,
    endpoint: &Endpoint,
    record: &ContentRecord,
    policy: &RetryPolicy,
) -> SecondaryRead {
    let started = Instant::now();
    let matched = match bounded_attempt(client, endpoint, &record.locator, policy).await {
        Ok(payload) => payload.digest() == record.expected_digest,
        Err(e) => {
            warn!(%endpoint, error = %e, "secondary read failed");
            false
        }
    };
    let elapsed = started.elapsed();

    if !matched {
        warn!(%endpoint, locator = %record.locator, "secondary read did not match the verified content");
    }
    SecondaryRead { elapsed, matched }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use bytes::Bytes;
    use w3bench_verify::digest;

    use super::*;
    use crate::data::Backend;

    enum Step {
        Ok(&'static [u8], u64),
        Fail(u64),
        Hang,
    }

    struct Scripted {
        steps: Mutex<Vec<Step>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut steps: Vec<Step>) -> Self {
            steps.reverse();
            Self {
                steps: Mutex::new(steps),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 { *self.calls.lock().unwrap() }
    }

    impl Retrieve for Scripted {
        async fn attempt(&self, _endpoint: &Endpoint, _locator: &str) -> Result<Payload, TransportError> {
            *self.calls.lock().unwrap() += 1;
            let step = self.steps.lock().unwrap().pop().unwrap_or(Step::Fail(1));
            match step {
                Step::Ok(body, ms) => {
                    sleep(Duration::from_millis(ms)).await;
                    Ok(Payload::Bytes(Bytes::from_static(body)))
                }
                Step::Fail(ms) => {
                    sleep(Duration::from_millis(ms)).await;
                    Err(TransportError::Connect("refused".into()))
                }
                Step::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    fn record() -> ContentRecord { ContentRecord::new(Backend::Swarm, 1, "ref", digest(b"abc")) }

    fn endpoint() -> Endpoint { Endpoint::http(Backend::Swarm, "gw.example") }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::default()
            .max_attempts(max_attempts)
            .attempt_timeout(Some(Duration::from_secs(10)))
            .retry_backoff(Duration::from_millis(100))
            .secondary_read(false)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_match_times_one_attempt() {
        let client = Scripted::new(vec![Step::Ok(b"abc", 250)]);
        let outcome = run(&client, &endpoint(), &record(), &policy(5)).await;

        assert!(outcome.digest_matched);
        assert_eq!(outcome.attempts_used, 1);
        assert_eq!(outcome.elapsed, Duration::from_millis(250));
        assert_eq!(outcome.error, None);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_uses_every_attempt() {
        let client = Scripted::new(vec![]);
        let outcome = run(&client, &endpoint(), &record(), &policy(4)).await;

        assert!(!outcome.digest_matched);
        assert_eq!(outcome.attempts_used, 4);
        assert_eq!(outcome.error, Some(OutcomeError::Transport));
        assert_eq!(client.calls(), 4);
        // 4 x 1ms attempts plus 100 + 200 + 400ms backoff
        assert_eq!(outcome.elapsed, Duration::from_millis(704));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_includes_failed_predecessors() {
        let client = Scripted::new(vec![Step::Fail(50), Step::Ok(b"nope", 20), Step::Ok(b"abc", 30)]);
        let outcome = run(&client, &endpoint(), &record(), &policy(5)).await;

        assert!(outcome.digest_matched);
        assert_eq!(outcome.attempts_used, 3);
        assert_eq!(outcome.elapsed, Duration::from_millis(50 + 100 + 20 + 200 + 30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried_and_reported() {
        let client = Scripted::new(vec![Step::Hang, Step::Hang]);
        let outcome = run(&client, &endpoint(), &record(), &policy(2)).await;

        assert!(!outcome.digest_matched);
        assert_eq!(outcome.error, Some(OutcomeError::Timeout));
        assert_eq!(outcome.elapsed, Duration::from_millis(20_100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_mismatch_is_integrity() {
        let client = Scripted::new(vec![Step::Fail(1), Step::Ok(b"abd", 1)]);
        let outcome = run(&client, &endpoint(), &record(), &policy(2)).await;
        assert_eq!(outcome.error, Some(OutcomeError::Integrity));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_runs_once() {
        let client = Scripted::new(vec![Step::Ok(b"abc", 5)]);
        let outcome = run(&client, &endpoint(), &record(), &policy(0)).await;
        assert!(outcome.digest_matched);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_secondary_mismatch_keeps_primary_success() {
        let client = Scripted::new(vec![Step::Ok(b"abc", 40), Step::Ok(b"changed", 15)]);
        let outcome = run(&client, &endpoint(), &record(), &policy(3).secondary_read(true)).await;

        assert!(outcome.digest_matched);
        assert_eq!(outcome.elapsed, Duration::from_millis(40));
        assert_eq!(outcome.secondary, Some(SecondaryRead {
            elapsed: Duration::from_millis(15),
            matched: false,
        }));
        assert_eq!(client.calls(), 2);
    }
}
