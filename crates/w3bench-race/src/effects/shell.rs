use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use rand::seq::SliceRandom;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::TransportError;

/// Captured result of a remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    /// `None` when the command was killed by a signal.
    pub status: Option<i32>,
    pub stdout: Bytes,
    pub stderr: String,
}

impl ShellOutput {
    pub fn success(&self) -> bool { self.status == Some(0) }

    /// Standard output of a successful command, or the exit as an error.
    pub fn into_stdout(self) -> Result<Bytes, TransportError> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(TransportError::RemoteExit {
                status: self.status.unwrap_or(-1),
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// An authenticated session to a named host that runs single-line commands.
///
/// Failing to connect or authenticate is a [`TransportError`]; a command that
/// ran and exited non-zero is reported through [`ShellOutput::status`].
pub trait RemoteShell: Send + Sync {
    fn run(&self, host: &str, command: &str) -> impl Future<Output = Result<ShellOutput, TransportError>> + Send;
}

impl<S: RemoteShell> RemoteShell for std::sync::Arc<S> {
    fn run(&self, host: &str, command: &str) -> impl Future<Output = Result<ShellOutput, TransportError>> + Send {
        (**self).run(host, command)
    }
}

/// Single-quote `s` for a POSIX shell.
pub(crate) fn quote(s: &str) -> String { format!("'{}'", s.replace('\'', r"'\''")) }

/// Exit status the OpenSSH client uses for its own failures.
const SSH_FAILURE: i32 = 255;

/// [`RemoteShell`] backed by the system `ssh` client in batch mode.
///
/// The child is killed when the returned future is dropped, so a timeout
/// around [`RemoteShell::run`] does not leak a local process.
#[derive(Debug, Clone)]
pub struct SshShell {
    program: String,
    username: String,
    connect_timeout: Duration,
    options: Vec<String>,
}

impl SshShell {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            program: "ssh".to_string(),
            username: username.into(),
            connect_timeout: Duration::from_secs(15),
            options: Vec::new(),
        }
    }

    #[must_use]
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Extra `-o` option, e.g. `StrictHostKeyChecking=accept-new`.
    #[must_use]
    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    fn command(&self, host: &str, remote: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)));
        for option in &self.options {
            cmd.arg("-o").arg(option);
        }
        cmd.arg("-l")
            .arg(&self.username)
            .arg(host)
            .arg("--")
            .arg(remote)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl RemoteShell for SshShell {
    async fn run(&self, host: &str, command: &str) -> Result<ShellOutput, TransportError> {
        debug!(host, command, "running remote command");
        let output = self.command(host, command).output().await?;
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.code() == Some(SSH_FAILURE) {
            return Err(if stderr.contains("Permission denied") || stderr.contains("Host key verification failed") {
                TransportError::Auth { host: host.to_string() }
            } else {
                TransportError::Connect(format!("{host}: {}", stderr.trim()))
            });
        }

        Ok(ShellOutput {
            status: output.status.code(),
            stdout: Bytes::from(output.stdout),
            stderr,
        })
    }
}

const KUBECTL_LOOKUP: &str = "which kubectl";
const KUBECTL_API_IPS: &str = "sudo kubectl get svc -n bee -o json | jq -r '.items[] | select(.metadata.labels.endpoint == \"api\").spec.clusterIP'";

/// Pick the node API address a control host should fetch from.
///
/// Uses a random `endpoint=api` service IP from the host's cluster when
/// `kubectl` is available there, and `fallback` otherwise or on any error.
pub async fn discover_target<S: RemoteShell>(shell: &S, host: &str, fallback: &str) -> String {
    let lookup = match shell.run(host, KUBECTL_LOOKUP).await {
        Ok(lookup) => lookup,
        Err(e) => {
            warn!(host, error = %e, "target discovery failed, using {fallback}");
            return fallback.to_string();
        }
    };
    if !lookup.success() {
        debug!(host, "kubectl not available, using {fallback}");
        return fallback.to_string();
    }

    let ips = match shell.run(host, KUBECTL_API_IPS).await.and_then(ShellOutput::into_stdout) {
        Ok(stdout) => String::from_utf8_lossy(&stdout)
            .lines()
            .map(|l| l.trim().trim_matches('"').to_string())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>(),
        Err(e) => {
            warn!(host, error = %e, "listing api services failed, using {fallback}");
            return fallback.to_string();
        }
    };

    ips.choose(&mut rand::thread_rng()).cloned().unwrap_or_else(|| fallback.to_string())
}
