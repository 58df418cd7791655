use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use w3bench_metrics::MetricsEmitter;
use w3bench_race::{
    DirectHttp, GeoLocator, RaceCoordinator, ReqwestClient, Retrievers, Scheme, ShellHttp, ShellTool, SshShell,
    ToolSpec,
};
use w3bench_store::ReferenceStore;

use crate::cli::{App, Commands};
use crate::config::Settings;
use crate::runner::{Mode, Runner};
use crate::topology::Topology;
use crate::upload::Publisher;

mod cli;
mod config;
mod payload;
mod runner;
mod topology;
mod upload;

/// How long an interrupted run waits for remote tool cleanups.
const CLEANUP_GRACE: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app = App::parse();
    let settings = Settings::load(&app.config)?;

    let target = if app.no_push { None } else { Some(settings.push_target()?) };
    let metrics = Arc::new(MetricsEmitter::new(target).context("failed to register metrics")?);
    let mut store = ReferenceStore::load(&app.store)
        .with_context(|| format!("failed to load reference store {}", app.store.display()))?;
    info!(path = %store.path().display(), records = store.len(), "reference store loaded");

    let shell = Arc::new(SshShell::new(settings.username()).option("StrictHostKeyChecking=accept-new"));
    let geo = GeoLocator::new(settings.ipinfo_token.clone()).context("failed to build geolocation client")?;
    let topology = Topology::discover(&settings, &*shell, &geo).await;

    let (mode, run_args) = match app.cmd {
        Commands::Upload(args) => {
            let publisher = Publisher::new(&args.url, &args.ipfs_api)?;
            (Mode::Upload { publisher, size_kb: args.size }, args.run)
        }
        Commands::Race(args) => (Mode::Check, args),
        Commands::Download(args) => (Mode::Download, args),
    };

    let attempt_timeout = Duration::from_secs(settings.attempt_timeout_secs);
    let shell_tool = ShellTool::new(
        shell.clone(),
        ToolSpec::new(&settings.tool_command).timeout(Duration::from_secs(settings.tool_timeout_secs)),
        settings.tool_concurrency,
    );
    let cleanups = shell_tool.pending_cleanups();
    let retrievers = Retrievers {
        http: DirectHttp::new(ReqwestClient::new(Duration::from_secs(30))?).primary(Scheme::Https),
        shell_http: ShellHttp::new(shell).max_time(Some(attempt_timeout)),
        shell_tool,
    };
    let coordinator = RaceCoordinator::new(retrievers, settings.race_options(run_args.max_attempts));
    let runner = Runner::new(coordinator, metrics.clone(), topology);

    // the run future is dropped when select! returns, which spawns the
    // remote cleanup of any tool attempt still in flight
    let interrupted = tokio::select! {
        result = runner.run(&mode, &run_args, &mut store) => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        warn!(pending_cleanups = cleanups.len(), "interrupted, pushing metrics before exit");
        metrics.flush().await;
        let abandoned = cleanups.drain(CLEANUP_GRACE).await;
        if abandoned > 0 {
            warn!(abandoned, "remote cleanups still running at exit");
        }
    }
    Ok(())
}
