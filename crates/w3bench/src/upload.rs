use std::time::{Duration, Instant};

use anyhow::{Context, anyhow, bail};
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::info;
use w3bench_race::{Backend, ContentRecord};
use w3bench_verify::Sha256Hash;

#[derive(Debug, Deserialize)]
struct SwarmUpload {
    reference: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IpfsAdded {
    hash: String,
    name: String,
}

/// Swarm answers `{"reference": "…"}`.
pub fn swarm_locator(body: &str) -> anyhow::Result<String> {
    let upload: SwarmUpload = serde_json::from_str(body).context("unexpected Swarm upload response")?;
    if upload.reference.is_empty() {
        bail!("Swarm upload response has an empty reference");
    }
    Ok(upload.reference)
}

/// IPFS `add` streams one JSON object per line; the last one is the file.
pub fn ipfs_locator(body: &str) -> anyhow::Result<String> {
    let line = body
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| anyhow!("empty IPFS add response"))?;
    let added: IpfsAdded = serde_json::from_str(line).context("unexpected IPFS add response")?;
    Ok(format!("{}?filename={}", added.hash, added.name))
}

/// Publishes payloads to Swarm and IPFS.
pub struct Publisher {
    client: reqwest::Client,
    swarm_url: String,
    ipfs_api: String,
}

impl Publisher {
    pub fn new(swarm_url: impl Into<String>, ipfs_api: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("failed to build upload client")?;
        Ok(Self {
            client,
            swarm_url: swarm_url.into(),
            ipfs_api: ipfs_api.into().trim_end_matches('/').to_string(),
        })
    }

    /// Upload `payload` and describe the published content.
    pub async fn publish(&self, backend: Backend, size_kb: u32, payload: &str, digest: Sha256Hash) -> anyhow::Result<ContentRecord> {
        let uploaded_at = Utc::now();
        let started = Instant::now();
        let locator = match backend {
            Backend::Swarm => self.swarm(payload).await?,
            Backend::Ipfs => self.ipfs(payload).await?,
        };
        let duration = started.elapsed();

        info!(%backend, %locator, ?duration, "published");
        Ok(ContentRecord::new(backend, size_kb, locator, digest).uploaded(uploaded_at, duration))
    }

    async fn swarm(&self, payload: &str) -> anyhow::Result<String> {
        let response = self
            .client
            .post(&self.swarm_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await
            .with_context(|| format!("Swarm upload to {} failed", self.swarm_url))?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            bail!("Swarm upload to {} returned {status}: {body}", self.swarm_url);
        }
        swarm_locator(&body)
    }

    async fn ipfs(&self, payload: &str) -> anyhow::Result<String> {
        let part = Part::text(payload.to_string())
            .file_name("payload.json")
            .mime_str("application/json")?;
        let url = format!("{}/api/v0/add", self.ipfs_api);
        let response = self
            .client
            .post(&url)
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .with_context(|| format!("IPFS add to {url} failed"))?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            bail!("IPFS add to {url} returned {status}: {body}");
        }
        ipfs_locator(&body)
    }
}
