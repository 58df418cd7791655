use std::time::Duration;

use super::model::Transport;

/// Attempt bound and timing for one endpoint's retry loop.
///
/// # Examples
///
/// ```
/// use w3bench_race::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default()
///     .max_attempts(5)
///     .attempt_timeout(Some(Duration::from_secs(30)))
///     .secondary_read(false);
/// assert_eq!(policy.max_attempts, 5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    ///
    /// Default: 15
    pub max_attempts: u32,

    /// Bound on a single attempt. `None` leaves timing to the client, which
    /// is how the remote tool transport enforces its own, larger limit.
    ///
    /// Default: 5 minutes
    pub attempt_timeout: Option<Duration>,

    /// Base delay for exponential backoff between attempts.
    ///
    /// Default: 100ms
    pub retry_backoff: Duration,

    /// Upper bound on a single backoff delay.
    ///
    /// Default: 10s
    pub max_backoff: Duration,

    /// Re-read once after a verified retrieval and compare digests again.
    ///
    /// Default: true
    pub secondary_read: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            attempt_timeout: Some(Duration::from_secs(300)),
            retry_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            secondary_read: true,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn attempt_timeout(mut self, attempt_timeout: Option<Duration>) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    #[must_use]
    pub fn retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    #[must_use]
    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    #[must_use]
    pub fn secondary_read(mut self, secondary_read: bool) -> Self {
        self.secondary_read = secondary_read;
        self
    }

    pub(crate) fn attempts(&self) -> u32 { self.max_attempts.max(1) }
}

/// Per-transport retry policies plus the optional race-wide deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceOptions {
    pub http: RetryPolicy,
    pub shell_http: RetryPolicy,
    pub shell_tool: RetryPolicy,

    /// Deadline for the whole race. Endpoints still running when it passes
    /// are cancelled and reported as [`OutcomeError::Cancelled`](crate::OutcomeError::Cancelled).
    ///
    /// Default: None
    pub race_timeout: Option<Duration>,
}

impl Default for RaceOptions {
    fn default() -> Self {
        Self {
            http: RetryPolicy::default(),
            shell_http: RetryPolicy::default(),
            shell_tool: RetryPolicy::default().max_attempts(3).attempt_timeout(None),
            race_timeout: None,
        }
    }
}

impl RaceOptions {
    /// Same policy for every transport.
    pub fn uniform(policy: RetryPolicy) -> Self {
        Self {
            http: policy.clone(),
            shell_http: policy.clone(),
            shell_tool: policy,
            race_timeout: None,
        }
    }

    #[must_use]
    pub fn race_timeout(mut self, race_timeout: Option<Duration>) -> Self {
        self.race_timeout = race_timeout;
        self
    }

    pub fn policy_for(&self, transport: Transport) -> &RetryPolicy {
        match transport {
            Transport::Http => &self.http,
            Transport::RemoteShellHttp => &self.shell_http,
            Transport::RemoteShellTool => &self.shell_tool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_attempts_runs_once() {
        assert_eq!(RetryPolicy::default().max_attempts(0).attempts(), 1);
    }

    #[test]
    fn test_tool_transport_defaults_to_client_side_timing() {
        let options = RaceOptions::default();
        let tool = options.policy_for(Transport::RemoteShellTool);
        assert_eq!(tool.attempt_timeout, None);
        assert_eq!(tool.max_attempts, 3);
        assert_eq!(options.policy_for(Transport::Http).max_attempts, 15);
    }
}
