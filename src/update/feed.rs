//! The release feed: which versions are published and where to get them.

use std::{path::Path, time::Duration};

use log::debug;
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::{error::Result, utils::download_file};

/// A published file of a release.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct Asset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub url: String,
}

/// A published release, named after its version.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct Release {
    pub name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// Parses a release listing, newest release first.
pub fn parse_releases(body: &[u8]) -> Result<Vec<Release>> {
    Ok(serde_json::from_slice(body)?)
}

pub trait ReleaseFeed: Send + Sync {
    fn fetch_releases(&self, url: &str) -> Result<Vec<Release>>;

    /// Downloads `url` into the file `dest`.
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// The feed served over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFeed {
    client: Client,
}
impl HttpFeed {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            // The GitHub API refuses requests without a user agent.
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(HttpFeed { client })
    }
}
impl ReleaseFeed for HttpFeed {
    fn fetch_releases(&self, url: &str) -> Result<Vec<Release>> {
        debug!("GET {}", url);
        let body = self.client.get(url).send()?.error_for_status()?.bytes()?;
        parse_releases(&body)
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        download_file(&self.client, url, dest)?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
