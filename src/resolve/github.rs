//! GitHub releases resolver
//!
//! Fetches the latest release of a repository.
//! API endpoint: https://api.github.com/repos/{owner}/{repo}/releases/latest
//!
//! The asset is chosen by a per-ABI file name pattern; GitHub reports its
//! exact size, which the download pipeline verifies.

use crate::domain::{Abi, App, DeviceEnvironment, LatestVersion};
use crate::error::ResolveError;
use crate::fetch::{fetch_json, CacheMode, Fetcher};
use crate::resolve::{fetch_failed, lookup_abi, select_abi, SourceResolver};
use async_trait::async_trait;
use chrono::DateTime;
use regex::Regex;
use serde::Deserialize;

/// GitHub API base URL
const GITHUB_API_URL: &str = "https://api.github.com/repos";

/// GitHub releases resolver
pub struct GithubReleaseResolver {
    repository: String,
    assets: &'static [(Abi, &'static str)],
    tag_prefix: String,
}

/// Latest release response
#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    published_at: Option<String>,
    #[serde(default)]
    assets: Vec<Asset>,
}

/// Release asset
#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
    browser_download_url: String,
    size: u64,
}

impl GithubReleaseResolver {
    pub fn new(
        repository: impl Into<String>,
        assets: &'static [(Abi, &'static str)],
        tag_prefix: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            assets,
            tag_prefix: tag_prefix.into(),
        }
    }

    fn build_url(&self) -> String {
        format!("{}/{}/releases/latest", GITHUB_API_URL, self.repository)
    }

    /// Version from a tag, without the app's tag prefix and a leading `v`
    fn version_from_tag<'a>(&self, tag: &'a str) -> &'a str {
        let tag = tag.strip_prefix(self.tag_prefix.as_str()).unwrap_or(tag);
        tag.strip_prefix('v').unwrap_or(tag)
    }
}

#[async_trait]
impl SourceResolver for GithubReleaseResolver {
    fn source_name(&self) -> &'static str {
        "GitHub"
    }

    async fn fetch_latest_update(
        &self,
        fetcher: &dyn Fetcher,
        app: App,
        device: &DeviceEnvironment,
        mode: CacheMode,
    ) -> Result<LatestVersion, ResolveError> {
        let abi = select_abi(app, device)?;
        let pattern = lookup_abi(app, abi, self.assets)?;
        let matcher = Regex::new(pattern).map_err(|e| {
            ResolveError::missing_data(app.id(), format!("invalid asset pattern '{}': {}", pattern, e))
        })?;

        let url = self.build_url();
        let release: Release = fetch_json(fetcher, &url, mode)
            .await
            .map_err(|e| fetch_failed(app, e))?;

        let asset = release
            .assets
            .iter()
            .find(|asset| matcher.is_match(&asset.name))
            .ok_or_else(|| {
                ResolveError::missing_data(
                    app.id(),
                    format!("release {} has no asset matching '{}'", release.tag_name, pattern),
                )
            })?;

        let published_at = release.published_at.as_deref().ok_or_else(|| {
            ResolveError::missing_data(app.id(), format!("release {} is not published", release.tag_name))
        })?;
        let publish_date = DateTime::parse_from_rfc3339(published_at).map_err(|e| {
            ResolveError::missing_data(app.id(), format!("invalid publish date '{}': {}", published_at, e))
        })?;

        let version = self.version_from_tag(&release.tag_name);
        tracing::debug!(app = app.id(), version, asset = %asset.name, "resolved GitHub release");

        Ok(
            LatestVersion::new(asset.browser_download_url.clone(), version, publish_date)
                .with_size(asset.size),
        )
    }
}
