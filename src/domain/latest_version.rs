//! Resolved version records

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Latest version of an app as published by its source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestVersion {
    /// Directly fetchable URL of the artifact
    pub download_url: String,
    /// Version string as understood by the app's version scheme
    pub version: String,
    /// Version string shown to users
    pub display_version: String,
    pub publish_date: DateTime<FixedOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_file_size_bytes_of_download: Option<u64>,
    /// Lowercase hex SHA-256 of the downloaded file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
}

impl LatestVersion {
    /// Create a record whose display version equals the version
    pub fn new(
        download_url: impl Into<String>,
        version: impl Into<String>,
        publish_date: DateTime<FixedOffset>,
    ) -> Self {
        let version = version.into();
        Self {
            download_url: download_url.into(),
            display_version: version.clone(),
            version,
            publish_date,
            exact_file_size_bytes_of_download: None,
            file_hash: None,
        }
    }

    pub fn with_display_version(mut self, display_version: impl Into<String>) -> Self {
        self.display_version = display_version.into();
        self
    }

    pub fn with_size(mut self, bytes: u64) -> Self {
        self.exact_file_size_bytes_of_download = Some(bytes);
        self
    }

    pub fn with_hash(mut self, sha256: impl Into<String>) -> Self {
        self.file_hash = Some(sha256.into().to_ascii_lowercase());
        self
    }
}

/// Outcome of comparing a latest version with the installed one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheckResult {
    #[serde(flatten)]
    pub latest: LatestVersion,
    /// Installed version the check was made against
    pub installed_version: Option<String>,
    pub is_update_available: bool,
}

impl UpdateCheckResult {
    pub fn new(latest: LatestVersion, installed_version: Option<String>, available: bool) -> Self {
        Self {
            latest,
            installed_version,
            is_update_available: available,
        }
    }
}
