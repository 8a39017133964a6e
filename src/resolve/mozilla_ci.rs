//! Mozilla CI index resolver
//!
//! Reads the chain-of-trust document of an index task:
//! `{index_url}/artifacts/public/chain-of-trust.json`
//!
//! The task creation time is the version, the artifact entry carries the
//! SHA-256 of the APK. Nothing is guessed: missing fields are errors.

use crate::domain::{Abi, App, DeviceEnvironment, LatestVersion};
use crate::error::ResolveError;
use crate::fetch::{fetch_json, CacheMode, Fetcher};
use crate::resolve::{fetch_failed, lookup_abi, select_abi, SourceResolver};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use std::collections::HashMap;

/// Mozilla CI resolver
pub struct MozillaCiResolver {
    index_url: String,
    artifacts: &'static [(Abi, &'static str)],
}

/// chain-of-trust.json response
#[derive(Debug, Deserialize)]
struct ChainOfTrust {
    task: Option<Task>,
    #[serde(default)]
    artifacts: HashMap<String, Artifact>,
}

#[derive(Debug, Deserialize)]
struct Task {
    /// Creation time, e.g. `2021-01-19T21:52:21.911Z`
    created: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Artifact {
    sha256: Option<String>,
}

impl MozillaCiResolver {
    pub fn new(index_url: impl Into<String>, artifacts: &'static [(Abi, &'static str)]) -> Self {
        Self {
            index_url: index_url.into().trim_end_matches('/').to_string(),
            artifacts,
        }
    }

    fn build_chain_of_trust_url(&self) -> String {
        format!("{}/artifacts/public/chain-of-trust.json", self.index_url)
    }

    fn build_artifact_url(&self, file_name: &str) -> String {
        format!("{}/artifacts/public/{}", self.index_url, file_name)
    }
}

#[async_trait]
impl SourceResolver for MozillaCiResolver {
    fn source_name(&self) -> &'static str {
        "Mozilla CI"
    }

    async fn fetch_latest_update(
        &self,
        fetcher: &dyn Fetcher,
        app: App,
        device: &DeviceEnvironment,
        mode: CacheMode,
    ) -> Result<LatestVersion, ResolveError> {
        let abi = select_abi(app, device)?;
        let file_name = lookup_abi(app, abi, self.artifacts)?;

        let url = self.build_chain_of_trust_url();
        let response: ChainOfTrust = fetch_json(fetcher, &url, mode)
            .await
            .map_err(|e| fetch_failed(app, e))?;

        let created = response
            .task
            .and_then(|task| task.created)
            .ok_or_else(|| ResolveError::missing_data(app.id(), "task creation time is missing"))?;
        let publish_date = DateTime::parse_from_rfc3339(&created).map_err(|e| {
            ResolveError::missing_data(app.id(), format!("invalid creation time '{}': {}", created, e))
        })?;

        let key = format!("public/{}", file_name);
        let hash = response
            .artifacts
            .get(&key)
            .and_then(|artifact| artifact.sha256.clone())
            .ok_or_else(|| {
                ResolveError::missing_data(app.id(), format!("artifact '{}' has no sha256", key))
            })?;

        tracing::debug!(app = app.id(), version = %created, %abi, "resolved Mozilla CI task");

        Ok(LatestVersion::new(self.build_artifact_url(file_name), created, publish_date)
            .with_display_version(publish_date.format("%Y-%m-%d").to_string())
            .with_hash(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FakeFetcher;

    const INDEX: &str = "https://firefox-ci-tc.services.mozilla.com/api/index/v1/task/project.mobile.focus.release.latest";

    const ARTIFACTS: &[(Abi, &str)] = &[
        (Abi::ArmeabiV7a, "app-klar-arm-release-unsigned.apk"),
        (Abi::Arm64V8a, "app-klar-aarch64-release-unsigned.apk"),
    ];

    const CHAIN_OF_TRUST: &str = r#"{
        "chainOfTrustVersion": 1,
        "task": { "created": "2021-01-19T21:52:21.911Z", "provisionerId": "mobile-3" },
        "artifacts": {
            "public/app-klar-arm-release-unsigned.apk": {
                "sha256": "110d3b39e260ec8ce32a74baeaaf57fb2e0d8f45015acba0923b353cd965afc3"
            },
            "public/app-klar-aarch64-release-unsigned.apk": {
                "sha256": "c5a3428e09bb6a70da619e369ff346d428d89a2d013f2433474f886459edc752"
            }
        }
    }"#;

    fn chain_of_trust_url() -> String {
        format!("{}/artifacts/public/chain-of-trust.json", INDEX)
    }

    #[tokio::test]
    async fn test_fetch_latest_update_arm() {
        let fetcher = FakeFetcher::new().with_text(&chain_of_trust_url(), CHAIN_OF_TRUST);
        let device = DeviceEnvironment::new(vec![Abi::ArmeabiV7a], 30);

        let latest = MozillaCiResolver::new(INDEX, ARTIFACTS)
            .fetch_latest_update(&fetcher, App::FirefoxKlar, &device, CacheMode::UseCache)
            .await
            .unwrap();

        assert_eq!(latest.version, "2021-01-19T21:52:21.911Z");
        assert_eq!(latest.display_version, "2021-01-19");
        assert_eq!(
            latest.download_url,
            format!("{}/artifacts/public/app-klar-arm-release-unsigned.apk", INDEX)
        );
        assert_eq!(
            latest.file_hash.as_deref(),
            Some("110d3b39e260ec8ce32a74baeaaf57fb2e0d8f45015acba0923b353cd965afc3")
        );
        assert_eq!(
            latest.publish_date,
            DateTime::parse_from_rfc3339("2021-01-19T21:52:21.911Z").unwrap()
        );
    }

    #[tokio::test]
    async fn test_fetch_latest_update_arm64() {
        let fetcher = FakeFetcher::new().with_text(&chain_of_trust_url(), CHAIN_OF_TRUST);
        let device = DeviceEnvironment::new(vec![Abi::Arm64V8a, Abi::ArmeabiV7a], 30);

        let latest = MozillaCiResolver::new(INDEX, ARTIFACTS)
            .fetch_latest_update(&fetcher, App::FirefoxKlar, &device, CacheMode::UseCache)
            .await
            .unwrap();

        assert!(latest
            .download_url
            .ends_with("app-klar-aarch64-release-unsigned.apk"));
        assert_eq!(
            latest.file_hash.as_deref(),
            Some("c5a3428e09bb6a70da619e369ff346d428d89a2d013f2433474f886459edc752")
        );
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_closed() {
        let body = r#"{ "task": { "created": "2021-01-19T21:52:21.911Z" }, "artifacts": {} }"#;
        let fetcher = FakeFetcher::new().with_text(&chain_of_trust_url(), body);
        let device = DeviceEnvironment::new(vec![Abi::Arm64V8a], 30);

        let err = MozillaCiResolver::new(INDEX, ARTIFACTS)
            .fetch_latest_update(&fetcher, App::FirefoxKlar, &device, CacheMode::UseCache)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingData { .. }));
    }

    #[tokio::test]
    async fn test_missing_task_fails_closed() {
        let fetcher = FakeFetcher::new().with_text(&chain_of_trust_url(), r#"{ "artifacts": {} }"#);
        let device = DeviceEnvironment::new(vec![Abi::Arm64V8a], 30);

        let err = MozillaCiResolver::new(INDEX, ARTIFACTS)
            .fetch_latest_update(&fetcher, App::FirefoxKlar, &device, CacheMode::UseCache)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("creation time"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_missing_data() {
        let fetcher = FakeFetcher::new().with_text(&chain_of_trust_url(), "<html>");
        let device = DeviceEnvironment::new(vec![Abi::Arm64V8a], 30);

        let err = MozillaCiResolver::new(INDEX, ARTIFACTS)
            .fetch_latest_update(&fetcher, App::FirefoxKlar, &device, CacheMode::UseCache)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingData { .. }));
    }
}
