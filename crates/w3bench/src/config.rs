use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Deserializer, Serialize};
use w3bench_metrics::PushTarget;
use w3bench_race::{RaceOptions, RetryPolicy};

/// Environment variables that override the configuration file, one per field.
const ENV_KEYS: [&str; 11] = [
    "SSH_SERVERS",
    "HTTP_SERVERS",
    "IPFS_SERVERS",
    "TOOL_SERVERS",
    "USERNAME",
    "PROMETHEUS_GW",
    "PROMETHEUS_USER",
    "PROMETHEUS_PW",
    "IPINFO_TOKEN",
    "HOSTNAME",
    "TOOL_COMMAND",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Control hosts fetching from their cluster's Swarm node over `curl`.
    #[serde(default, deserialize_with = "string_or_list")]
    pub ssh_servers: Vec<String>,
    /// Public Swarm gateways.
    #[serde(default, deserialize_with = "string_or_list")]
    pub http_servers: Vec<String>,
    /// Public IPFS gateways.
    #[serde(default, deserialize_with = "string_or_list")]
    pub ipfs_servers: Vec<String>,
    /// Control hosts fetching with the download tool.
    #[serde(default, deserialize_with = "string_or_list")]
    pub tool_servers: Vec<String>,

    pub username: Option<String>,
    pub prometheus_gw: Option<String>,
    pub prometheus_user: Option<String>,
    pub prometheus_pw: Option<String>,
    pub ipinfo_token: Option<String>,
    /// Names this machine in the push job and stands in for an undiscoverable node.
    pub hostname: Option<String>,

    pub tool_command: String,
    pub tool_timeout_secs: u64,
    pub tool_max_attempts: u32,
    pub tool_concurrency: usize,
    pub attempt_timeout_secs: u64,
    pub race_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ssh_servers: Vec::new(),
            http_servers: Vec::new(),
            ipfs_servers: Vec::new(),
            tool_servers: Vec::new(),
            username: None,
            prometheus_gw: None,
            prometheus_user: None,
            prometheus_pw: None,
            ipinfo_token: None,
            hostname: None,
            tool_command: "curl -sSL -o {output} http://localhost:1633/bzz/{locator}".to_string(),
            tool_timeout_secs: 1800,
            tool_max_attempts: 3,
            tool_concurrency: 4,
            attempt_timeout_secs: 300,
            race_timeout_secs: None,
        }
    }
}

impl Settings {
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(path))
            .merge(Env::raw().only(&ENV_KEYS))
    }

    /// Defaults, then the JSON file at `path` if present, then the environment.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Self::figment(path)
            .extract()
            .with_context(|| format!("invalid configuration in {} or environment", path.display()))
    }

    pub fn username(&self) -> &str { self.username.as_deref().unwrap_or("root") }

    pub fn hostname(&self) -> &str { self.hostname.as_deref().unwrap_or("localhost") }

    pub fn job_label(&self) -> String {
        format!("web3storage_speed_{}", self.hostname.as_deref().unwrap_or("unknown"))
    }

    /// Push-gateway destination. Every credential must be present.
    pub fn push_target(&self) -> anyhow::Result<PushTarget> {
        let (Some(url), Some(username), Some(password)) =
            (&self.prometheus_gw, &self.prometheus_user, &self.prometheus_pw)
        else {
            bail!("prometheus_gw, prometheus_user and prometheus_pw must all be set (or pass --no-push)");
        };
        Ok(PushTarget {
            url: url.clone(),
            job: self.job_label(),
            username: username.clone(),
            password: password.clone(),
        })
    }

    pub fn race_options(&self, max_attempts: u32) -> RaceOptions {
        let policy = RetryPolicy::default()
            .max_attempts(max_attempts)
            .attempt_timeout(Some(Duration::from_secs(self.attempt_timeout_secs)));
        let mut options = RaceOptions::uniform(policy)
            .race_timeout(self.race_timeout_secs.map(Duration::from_secs));
        options.shell_tool = RetryPolicy::default()
            .max_attempts(self.tool_max_attempts)
            .attempt_timeout(None);
        options
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<String>),
    One(String),
}

/// A JSON list, or one comma-separated string as environment variables carry.
fn string_or_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let items = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(items) => items,
        OneOrMany::One(joined) => joined.split(',').map(str::to_string).collect(),
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
