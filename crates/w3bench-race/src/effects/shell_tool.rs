use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use w3bench_verify::Sha256Hash;

use super::shell::{RemoteShell, quote};
use super::{Payload, Retrieve};
use crate::data::Endpoint;
use crate::error::TransportError;

/// Exit status of coreutils `timeout` when the wrapped command ran out of time.
const TIMEOUT_EXIT: i32 = 124;

/// How the remote download tool is invoked.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    /// Command template; `{locator}` and `{output}` are substituted shell-quoted.
    pub command: String,
    /// Remote directory holding per-locator output files.
    pub output_dir: String,
    /// Wall-clock bound enforced remotely through `timeout`.
    pub timeout: Duration,
    /// Extra local slack before the session itself is abandoned.
    pub grace: Duration,
}

impl ToolSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            output_dir: "/tmp".to_string(),
            timeout: Duration::from_secs(1800),
            grace: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn output_dir(mut self, output_dir: impl Into<String>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Fixed output path for `locator`; every attempt for it reuses the path.
    pub fn output_path(&self, locator: &str) -> String {
        let name: String = locator.chars().filter(char::is_ascii_alphanumeric).take(32).collect();
        format!("{}/w3bench-{name}.out", self.output_dir.trim_end_matches('/'))
    }

    pub(crate) fn fetch_command(&self, locator: &str, output: &str) -> String {
        let tool = self.command.replace("{locator}", &quote(locator)).replace("{output}", &quote(output));
        format!("timeout {} {tool}", self.timeout.as_secs().max(1))
    }
}

/// Kill whatever still writes to `output`, then remove it.
///
/// The path is only ever assembled from two shell variables, so the command
/// line of the shell running this never contains it and `pkill -f` cannot
/// take that shell down before `rm` runs.
pub(crate) fn cleanup_command(output: &str) -> String {
    let split = output.char_indices().nth(1).map_or(output.len(), |(i, _)| i);
    if split == 0 {
        return "true".to_string();
    }
    let (head, tail) = output.split_at(split);
    format!(
        "h={}; t={}; pkill -f \"$h$t\" ; rm -rf \"$h$t\" ; true",
        quote(head),
        quote(tail)
    )
}

pub(crate) fn digest_command(output: &str) -> String { format!("sha256sum {}", quote(output)) }

fn parse_sha256sum(stdout: &[u8]) -> Result<Sha256Hash, TransportError> {
    let text = String::from_utf8_lossy(stdout);
    let token = text.split_whitespace().next().unwrap_or_default();
    Sha256Hash::from_hex(token).map_err(|_| TransportError::Protocol(format!("unexpected sha256sum output: {text}")))
}

/// Fetch with a long-running tool on a control host and hash the result there.
///
/// Stale processes and files at the output path are removed before the tool
/// starts, and again after it finishes on every path: success, failure,
/// timeout and digest mismatch alike. If the attempt future is dropped
/// mid-flight the cleanup is spawned onto the runtime instead.
///
/// Tool runs are bounded by a semaphore shared by all endpoints using this
/// client.
pub struct ShellTool<S> {
    shell: Arc<S>,
    spec: ToolSpec,
    slots: Arc<Semaphore>,
    pending: PendingCleanups,
}

impl<S: RemoteShell + 'static> ShellTool<S> {
    pub fn new(shell: Arc<S>, spec: ToolSpec, max_concurrent: usize) -> Self {
        Self {
            shell,
            spec,
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            pending: PendingCleanups::default(),
        }
    }

    pub fn spec(&self) -> &ToolSpec { &self.spec }

    /// Cleanups spawned by attempts dropped mid-flight, for draining at shutdown.
    pub fn pending_cleanups(&self) -> PendingCleanups { self.pending.clone() }

    async fn cleanup(&self, host: &str, output: &str) {
        match self.shell.run(host, &cleanup_command(output)).await {
            Ok(out) if out.success() => debug!(host, output, "remote output cleaned"),
            Ok(out) => warn!(host, output, status = ?out.status, "remote cleanup exited non-zero"),
            Err(e) => warn!(host, output, error = %e, "remote cleanup failed"),
        }
    }

    async fn fetch_and_digest(&self, host: &str, locator: &str, output: &str) -> Result<Sha256Hash, TransportError> {
        let bound = self.spec.timeout + self.spec.grace;
        let command = self.spec.fetch_command(locator, output);

        let ran = tokio::time::timeout(bound, self.shell.run(host, &command))
            .await
            .map_err(|_| TransportError::Timeout(bound))??;
        if ran.status == Some(TIMEOUT_EXIT) {
            return Err(TransportError::Timeout(self.spec.timeout));
        }
        ran.into_stdout()?;

        let sum = self.shell.run(host, &digest_command(output)).await?.into_stdout()?;
        parse_sha256sum(&sum)
    }
}

impl<S: RemoteShell + 'static> Retrieve for ShellTool<S> {
    async fn attempt(&self, endpoint: &Endpoint, locator: &str) -> Result<Payload, TransportError> {
        let host = endpoint.address.as_str();
        let output = self.spec.output_path(locator);
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| TransportError::Protocol("tool worker pool closed".to_string()))?;

        let mut guard = CleanupGuard::new(self.shell.clone(), self.pending.clone(), host, &output);
        self.cleanup(host, &output).await;

        let result = self.fetch_and_digest(host, locator, &output).await;

        self.cleanup(host, &output).await;
        guard.disarm();

        Ok(Payload::Digest(result?))
    }
}

/// Remote cleanups running detached from the attempt that needed them.
///
/// Clones share one set, so the process entry point can wait for cleanups
/// spawned deep inside a cancelled race before the runtime shuts down.
#[derive(Clone, Default)]
pub struct PendingCleanups(Arc<Mutex<JoinSet<()>>>);

impl PendingCleanups {
    fn spawn_on<F: Future<Output = ()> + Send + 'static>(&self, task: F, handle: &Handle) {
        if let Ok(mut set) = self.0.lock() {
            while set.try_join_next().is_some() {}
            set.spawn_on(task, handle);
        }
    }

    pub fn len(&self) -> usize { self.0.lock().map_or(0, |set| set.len()) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Wait up to `limit` for every pending cleanup; returns how many were
    /// still running and got aborted.
    pub async fn drain(&self, limit: Duration) -> usize {
        let mut set = match self.0.lock() {
            Ok(mut set) => std::mem::take(&mut *set),
            Err(_) => return 0,
        };
        let _ = tokio::time::timeout(limit, async { while set.join_next().await.is_some() {} }).await;
        set.len()
    }
}

/// Spawns the remote cleanup if dropped while armed.
struct CleanupGuard<S: RemoteShell + 'static> {
    shell: Arc<S>,
    pending: PendingCleanups,
    host: String,
    output: String,
    armed: bool,
}

impl<S: RemoteShell + 'static> CleanupGuard<S> {
    fn new(shell: Arc<S>, pending: PendingCleanups, host: &str, output: &str) -> Self {
        Self {
            shell,
            pending,
            host: host.to_string(),
            output: output.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) { self.armed = false; }
}

impl<S: RemoteShell + 'static> Drop for CleanupGuard<S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!(host = %self.host, output = %self.output, "attempt dropped outside a runtime, remote output left behind");
            return;
        };
        let shell = self.shell.clone();
        let host = std::mem::take(&mut self.host);
        let output = std::mem::take(&mut self.output);
        self.pending.spawn_on(
            async move {
                if let Err(e) = shell.run(&host, &cleanup_command(&output)).await {
                    warn!(host, output, error = %e, "deferred remote cleanup failed");
                }
            },
            &handle,
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::Mutex;

    use bytes::Bytes;
    use w3bench_verify::digest;

    use super::*;
    use crate::data::Backend;
    use crate::effects::ShellOutput;

    const LOCATOR: &str = "abc123";

    enum Step {
        Hang,
        Write(&'static [u8]),
        Fail,
    }

    #[derive(Default)]
    struct Remote {
        files: HashMap<String, Vec<u8>>,
        procs: HashSet<String>,
        cleanups: usize,
    }

    /// Simulates the control host: the tool creates the output file and a
    /// process, cleanup removes both.
    struct FakeHost {
        spec: ToolSpec,
        remote: Mutex<Remote>,
        script: Mutex<VecDeque<Step>>,
    }

    impl FakeHost {
        fn new(spec: ToolSpec, script: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                spec,
                remote: Mutex::new(Remote::default()),
                script: Mutex::new(script.into()),
            })
        }

        fn leaked(&self) -> (usize, usize) {
            let remote = self.remote.lock().unwrap();
            (remote.files.len(), remote.procs.len())
        }

        fn cleanups(&self) -> usize { self.remote.lock().unwrap().cleanups }

        fn ok(stdout: impl Into<Bytes>) -> ShellOutput {
            ShellOutput { status: Some(0), stdout: stdout.into(), stderr: String::new() }
        }
    }

    impl RemoteShell for FakeHost {
        async fn run(&self, _host: &str, command: &str) -> Result<ShellOutput, TransportError> {
            let output = self.spec.output_path(LOCATOR);

            if command == cleanup_command(&output) {
                let mut remote = self.remote.lock().unwrap();
                remote.files.remove(&output);
                remote.procs.remove(&output);
                remote.cleanups += 1;
                return Ok(Self::ok(""));
            }

            if command == self.spec.fetch_command(LOCATOR, &output) {
                let step = self.script.lock().unwrap().pop_front().expect("script exhausted");
                {
                    let mut remote = self.remote.lock().unwrap();
                    remote.procs.insert(output.clone());
                    remote.files.insert(output.clone(), b"partial".to_vec());
                }
                return match step {
                    Step::Hang => std::future::pending().await,
                    Step::Write(bytes) => {
                        let mut remote = self.remote.lock().unwrap();
                        remote.files.insert(output.clone(), bytes.to_vec());
                        remote.procs.remove(&output);
                        Ok(Self::ok(""))
                    }
                    Step::Fail => {
                        self.remote.lock().unwrap().procs.remove(&output);
                        Ok(ShellOutput { status: Some(1), stdout: Bytes::new(), stderr: "tool failed".into() })
                    }
                };
            }

            if command == digest_command(&output) {
                let remote = self.remote.lock().unwrap();
                return Ok(match remote.files.get(&output) {
                    Some(bytes) => Self::ok(format!("{}  {output}\n", digest(bytes))),
                    None => ShellOutput { status: Some(1), stdout: Bytes::new(), stderr: "No such file".into() },
                });
            }

            Err(TransportError::Protocol(format!("unexpected command: {command}")))
        }
    }

    fn spec() -> ToolSpec {
        ToolSpec::new("swarm-cli download {locator} {output}")
            .timeout(Duration::from_secs(60))
            .grace(Duration::from_secs(5))
    }

    fn endpoint() -> Endpoint { Endpoint::shell_tool(Backend::Swarm, "ctl.example") }

    #[test]
    fn test_commands() {
        let spec = spec().output_dir("/var/tmp/");
        let output = spec.output_path("Qm/abc?filename=x");
        assert_eq!(output, "/var/tmp/w3bench-Qmabcfilenamex.out");
        assert_eq!(
            spec.fetch_command("Qm", &output),
            "timeout 60 swarm-cli download 'Qm' '/var/tmp/w3bench-Qmabcfilenamex.out'"
        );
        assert_eq!(
            cleanup_command(&output),
            r#"h='/'; t='var/tmp/w3bench-Qmabcfilenamex.out'; pkill -f "$h$t" ; rm -rf "$h$t" ; true"#
        );
        assert!(!cleanup_command(&output).contains(&output));
        assert_eq!(cleanup_command(""), "true");
    }

    #[test]
    fn test_parse_sha256sum() {
        let line = format!("{}  /tmp/x\n", digest(b"abc"));
        assert_eq!(parse_sha256sum(line.as_bytes()).unwrap(), digest(b"abc"));
        assert!(parse_sha256sum(b"sha256sum: /tmp/x: No such file").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_success_leaves_nothing_behind() {
        let host = FakeHost::new(spec(), vec![Step::Hang, Step::Write(b"abc")]);
        let tool = ShellTool::new(host.clone(), spec(), 2);

        let err = tool.attempt(&endpoint(), LOCATOR).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(host.leaked(), (0, 0));

        let got = tool.attempt(&endpoint(), LOCATOR).await.unwrap();
        assert_eq!(got, Payload::Digest(digest(b"abc")));
        assert_eq!(host.leaked(), (0, 0));
        assert_eq!(host.cleanups(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatch_and_failure_are_cleaned() {
        let host = FakeHost::new(spec(), vec![Step::Write(b"wrong"), Step::Fail, Step::Write(b"abc")]);
        let tool = ShellTool::new(host.clone(), spec(), 1);

        let wrong = tool.attempt(&endpoint(), LOCATOR).await.unwrap();
        assert_ne!(wrong.digest(), digest(b"abc"));
        assert_eq!(host.leaked(), (0, 0));

        assert!(matches!(
            tool.attempt(&endpoint(), LOCATOR).await,
            Err(TransportError::RemoteExit { status: 1, .. })
        ));
        assert_eq!(host.leaked(), (0, 0));

        assert_eq!(tool.attempt(&endpoint(), LOCATOR).await.unwrap().digest(), digest(b"abc"));
        assert_eq!(host.leaked(), (0, 0));
        assert_eq!(tool.slots.available_permits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_attempt_spawns_cleanup() {
        let host = FakeHost::new(spec(), vec![Step::Hang]);
        let tool = ShellTool::new(host.clone(), spec(), 1);

        let cut_short = tokio::time::timeout(Duration::from_secs(1), tool.attempt(&endpoint(), LOCATOR)).await;
        assert!(cut_short.is_err());
        assert_eq!(host.leaked(), (1, 1));
        assert_eq!(tool.pending_cleanups().len(), 1);

        assert_eq!(tool.pending_cleanups().drain(Duration::from_secs(5)).await, 0);
        assert_eq!(host.leaked(), (0, 0));
        assert!(tool.pending_cleanups().is_empty());
    }

    /// The generated commands run through a real `sh` on this machine, against
    /// a temporary directory standing in for the control host's disk.
    #[cfg(target_os = "linux")]
    mod local_shell {
        use std::path::Path;

        use tokio::process::Command;

        use super::*;

        struct LocalShell;

        impl RemoteShell for LocalShell {
            async fn run(&self, _host: &str, command: &str) -> Result<ShellOutput, TransportError> {
                let out = Command::new("sh").arg("-c").arg(command).kill_on_drop(true).output().await?;
                Ok(ShellOutput {
                    status: out.status.code(),
                    stdout: Bytes::from(out.stdout),
                    stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
                })
            }
        }

        /// Live processes whose command line mentions `path`.
        fn processes_mentioning(path: &str) -> usize {
            std::fs::read_dir("/proc")
                .unwrap()
                .filter_map(Result::ok)
                .filter_map(|entry| std::fs::read(entry.path().join("cmdline")).ok())
                .filter(|cmdline| String::from_utf8_lossy(cmdline).contains(path))
                .count()
        }

        /// Writes `partial` to the output, then hangs.
        const HANGING_TOOL: &str = r#"sh -c "echo partial > \"\$1\"; sleep 30" _ {output}"#;

        fn local_tool(dir: &Path, command: &str, timeout: Duration) -> (ShellTool<LocalShell>, String) {
            let spec = ToolSpec::new(command)
                .output_dir(dir.to_str().unwrap())
                .timeout(timeout)
                .grace(Duration::from_secs(5));
            let output = spec.output_path(LOCATOR);
            (ShellTool::new(Arc::new(LocalShell), spec, 1), output)
        }

        /// Signalled writers may take a moment to exit, so processes are polled.
        async fn assert_clean(output: &str) {
            assert!(!Path::new(output).exists(), "{output} left behind");
            for _ in 0..50 {
                if processes_mentioning(output) == 0 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            panic!("process still holds {output}");
        }

        #[tokio::test]
        async fn test_cleanup_removes_stale_file_and_writer() {
            let dir = tempfile::tempdir().unwrap();
            let output = dir.path().join("w3bench-stale.out").to_str().unwrap().to_string();
            std::fs::write(&output, b"partial").unwrap();
            let mut stale = Command::new("sh")
                .arg("-c")
                .arg("sleep 30; :")
                .arg(&output)
                .kill_on_drop(true)
                .spawn()
                .unwrap();

            let ran = LocalShell.run("localhost", &cleanup_command(&output)).await.unwrap();
            assert!(ran.success(), "cleanup exited with {:?}: {}", ran.status, ran.stderr);
            assert!(!Path::new(&output).exists());

            let status = tokio::time::timeout(Duration::from_secs(5), stale.wait()).await.unwrap().unwrap();
            assert!(!status.success());
        }

        #[tokio::test]
        async fn test_mismatch_then_success_leave_nothing_behind() {
            let dir = tempfile::tempdir().unwrap();

            let (wrong, output) = local_tool(dir.path(), "printf wrong > {output}", Duration::from_secs(10));
            assert_eq!(wrong.attempt(&endpoint(), LOCATOR).await.unwrap(), Payload::Digest(digest(b"wrong")));
            assert_clean(&output).await;

            let (right, output) = local_tool(dir.path(), "printf abc > {output}", Duration::from_secs(10));
            assert_eq!(right.attempt(&endpoint(), LOCATOR).await.unwrap(), Payload::Digest(digest(b"abc")));
            assert_clean(&output).await;
        }

        #[tokio::test]
        async fn test_timeout_leaves_nothing_behind() {
            let dir = tempfile::tempdir().unwrap();
            let (tool, output) = local_tool(dir.path(), HANGING_TOOL, Duration::from_secs(1));

            let err = tool.attempt(&endpoint(), LOCATOR).await.unwrap_err();
            assert!(err.is_timeout(), "unexpected {err:?}");
            assert_clean(&output).await;
        }

        #[tokio::test]
        async fn test_dropped_attempt_is_cleaned_after_drain() {
            let dir = tempfile::tempdir().unwrap();
            let (tool, output) = local_tool(dir.path(), HANGING_TOOL, Duration::from_secs(60));

            let cut_short = tokio::time::timeout(Duration::from_secs(1), tool.attempt(&endpoint(), LOCATOR)).await;
            assert!(cut_short.is_err());

            assert_eq!(tool.pending_cleanups().drain(Duration::from_secs(10)).await, 0);
            assert_clean(&output).await;
        }
    }
}
