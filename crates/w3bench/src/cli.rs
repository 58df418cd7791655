use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Clone, Debug, Parser)]
#[command(name = "w3bench", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    /// JSON configuration file; environment variables override its values.
    #[arg(long, global = true, default_value = "config.json")]
    pub config: PathBuf,

    /// Reference store of published content.
    #[arg(long, global = true, default_value = "references.json")]
    pub store: PathBuf,

    /// Keep metrics in-process instead of pushing them to the gateway.
    #[arg(long, global = true)]
    pub no_push: bool,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Publish fresh content to every backend and race all endpoints for it.
    #[command(alias = "up", name = "upload")]
    Upload(UploadArgs),
    /// Race the most recent record of each backend and size class.
    #[command(alias = "check", name = "race")]
    Race(RunArgs),
    /// Race every record in the reference store.
    #[command(alias = "dl", name = "download")]
    Download(RunArgs),
}

#[derive(Clone, Debug, Args)]
pub struct RunArgs {
    /// Number of rounds per cycle.
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,

    /// Loop forever, one cycle after another.
    #[arg(long)]
    pub continuous: bool,

    /// Attempt bound for HTTP and remote-shell-HTTP endpoints.
    #[arg(long, default_value_t = 15)]
    pub max_attempts: u32,
}

#[derive(Clone, Debug, Args)]
pub struct UploadArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Payload size in KB.
    #[arg(long, default_value_t = 100)]
    pub size: u32,

    /// Swarm upload endpoint.
    #[arg(long, default_value = "https://bee-1.fairdatasociety.org/bzz")]
    pub url: String,

    /// IPFS HTTP API base.
    #[arg(long, default_value = "http://127.0.0.1:5001")]
    pub ipfs_api: String,
}
