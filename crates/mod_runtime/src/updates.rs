//! Async update checking against remote release feeds.
//!
//! Each distinct repository URL is fetched on its own task; parsed
//! releases are pushed into the runtime's notice channel and applied on
//! the next primary tick. Network failures are logged and never surface
//! to the frame loop.

use crate::version::Version;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// One release entry in a feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Release {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub download_url: String,
}

/// A remote release feed: `{"releases": [{"Id": ..., "Version": ...}]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub releases: Vec<Release>,
}

/// A parsed release headed for the runtime's notice channel.
#[derive(Debug, Clone)]
pub struct ReleaseNotice {
    pub id: String,
    pub version: Version,
    pub download_url: String,
}

/// Fetches raw feed bodies. Abstracted so tests can run without sockets.
#[async_trait]
pub trait ReleaseFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<String>;
}

/// HTTP fetcher used in production.
#[derive(Default, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[async_trait]
impl ReleaseFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Spawns one fetch task per repository URL.
pub struct UpdateChecker {
    fetcher: Arc<dyn ReleaseFetcher>,
    tx: mpsc::UnboundedSender<ReleaseNotice>,
}

impl UpdateChecker {
    pub fn new(fetcher: Arc<dyn ReleaseFetcher>, tx: mpsc::UnboundedSender<ReleaseNotice>) -> Self {
        Self { fetcher, tx }
    }

    /// Kick off a check for every distinct URL. Returns the number of
    /// tasks spawned; completions arrive through the notice channel.
    pub fn check(&self, urls: &[String]) -> usize {
        let mut seen = HashSet::new();
        let mut spawned = 0;
        for url in urls {
            if !seen.insert(url.as_str()) {
                continue;
            }
            let fetcher = self.fetcher.clone();
            let tx = self.tx.clone();
            let url = url.clone();
            tokio::spawn(async move {
                fetch_one(fetcher, tx, url).await;
            });
            spawned += 1;
        }
        if spawned > 0 {
            info!("checking {spawned} release feed(s)");
        }
        spawned
    }
}

async fn fetch_one(
    fetcher: Arc<dyn ReleaseFetcher>,
    tx: mpsc::UnboundedSender<ReleaseNotice>,
    url: String,
) {
    let body = match fetcher.fetch(&url).await {
        Ok(body) => body,
        Err(e) => {
            error!("release feed '{url}': {e}");
            return;
        }
    };
    let repository: Repository = match serde_json::from_str(&body) {
        Ok(repository) => repository,
        Err(e) => {
            error!("release feed '{url}' is malformed: {e}");
            return;
        }
    };
    for release in repository.releases {
        if release.id.is_empty() || release.version.is_empty() {
            debug!("release feed '{url}' carries an incomplete entry, skipped");
            continue;
        }
        let notice = ReleaseNotice {
            id: release.id,
            version: Version::parse(&release.version),
            download_url: release.download_url,
        };
        // The runtime may be gone during shutdown; nothing to do then.
        if tx.send(notice).is_err() {
            return;
        }
    }
}
