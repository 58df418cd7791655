use std::time::Duration;

use super::shell::{RemoteShell, quote};
use super::{Payload, Retrieve};
use crate::core::parse_locator;
use crate::data::Endpoint;
use crate::error::TransportError;

/// Fetch through a control host: `curl` runs there against the endpoint's
/// target address and its standard output is the content.
pub struct ShellHttp<S> {
    shell: S,
    max_time: Option<Duration>,
}

impl<S: RemoteShell> ShellHttp<S> {
    pub fn new(shell: S) -> Self { Self { shell, max_time: None } }

    /// Passed to `curl --max-time` so a cancelled attempt does not linger remotely.
    #[must_use]
    pub fn max_time(mut self, max_time: Option<Duration>) -> Self {
        self.max_time = max_time;
        self
    }

    pub(crate) fn fetch_command(&self, endpoint: &Endpoint, locator: &str) -> Result<String, TransportError> {
        let target = endpoint
            .target
            .as_deref()
            .ok_or_else(|| TransportError::Connect(format!("{endpoint} has no target address")))?;
        let target = parse_locator(target)
            .map_err(|e| TransportError::Connect(e.to_string()))?
            .with_default_port(endpoint.backend.default_api_port());
        let scheme = target.scheme.as_deref().unwrap_or("http");
        let url = format!("{scheme}://{}/{}/{locator}", target.authority(), endpoint.backend.path_prefix());

        let mut command = String::from("curl -sSfL");
        if let Some(max_time) = self.max_time {
            command.push_str(&format!(" --max-time {}", max_time.as_secs().max(1)));
        }
        command.push(' ');
        command.push_str(&quote(&url));
        Ok(command)
    }
}

impl<S: RemoteShell> Retrieve for ShellHttp<S> {
    async fn attempt(&self, endpoint: &Endpoint, locator: &str) -> Result<Payload, TransportError> {
        let command = self.fetch_command(endpoint, locator)?;
        let body = self.shell.run(&endpoint.address, &command).await?.into_stdout()?;
        Ok(Payload::Bytes(body))
    }
}
