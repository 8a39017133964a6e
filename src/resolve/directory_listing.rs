//! Directory listing resolver
//!
//! Scrapes an Apache style listing such as https://dist.torproject.org/torbrowser/:
//! - the root lists one directory per version (`<a href="12.5.1/">12.5.1/</a>`)
//! - the version directory lists the artifacts with date, time and size
//!
//! The download URL is rebuilt from version and ABI token.

use crate::domain::{Abi, App, DeviceEnvironment, LatestVersion};
use crate::error::ResolveError;
use crate::fetch::{CacheMode, Fetcher};
use crate::resolve::{fetch_failed, lookup_abi, select_abi, SourceResolver};
use crate::version::compare_versions;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use regex::Regex;

/// Version directory names
const VERSION_PATTERN: &str = r"([\d\.]+)";

/// ABI tokens used in artifact file names
const ABI_TOKENS: &[(Abi, &str)] = &[
    (Abi::Arm64V8a, "aarch64"),
    (Abi::ArmeabiV7a, "armv7"),
    (Abi::X86_64, "x86_64"),
    (Abi::X86, "x86"),
];

/// Resolver for directory listings
pub struct DirectoryListingResolver {
    base_url: String,
    file_prefix: String,
}

impl DirectoryListingResolver {
    pub fn new(base_url: impl Into<String>, file_prefix: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            file_prefix: file_prefix.into(),
        }
    }

    fn file_name(&self, token: &str, version: &str) -> String {
        format!("{}-{}-{}.apk", self.file_prefix, token, version)
    }

    fn build_download_url(&self, version: &str, file_name: &str) -> String {
        format!("{}/{}/{}", self.base_url, version, file_name)
    }

    /// Listing of a version directory filtered to a single file
    fn build_listing_url(&self, version: &str, file_name: &str) -> String {
        format!("{}/{}/?P={}", self.base_url, version, file_name)
    }
}

/// Find the highest version directory in the root listing
///
/// Link target and link text must name the same version.
fn find_latest_version(content: &str) -> Option<String> {
    let pattern = format!(
        "{}{}{}{}{}",
        regex::escape("<a href=\""),
        VERSION_PATTERN,
        regex::escape("/\">"),
        VERSION_PATTERN,
        regex::escape("/</a>")
    );
    let re = Regex::new(&pattern).ok()?;

    re.captures_iter(content)
        .filter(|caps| caps[1] == caps[2])
        .map(|caps| caps[1].to_string())
        .max_by(|a, b| compare_versions(a, b))
}

/// Extract the modification time of the listed file
///
/// Matches `</a>   2023-07-04 13:30   82M\n` and yields `2023-07-04T13:30:00Z`.
fn find_publish_date(content: &str) -> Option<DateTime<FixedOffset>> {
    let pattern = format!(
        r"{}\s+(\d{{4}}-\d{{1,2}}-\d{{1,2}}) (\d{{1,2}}:\d{{1,2}})\s+((\d){{2,3}})M\s*\n",
        regex::escape("</a>")
    );
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(content)?;

    let timestamp = format!("{}T{}:00Z", &caps[1], &caps[2]);
    DateTime::parse_from_rfc3339(&timestamp).ok().or_else(|| {
        // Tolerate single digit fields, which RFC 3339 rejects
        NaiveDateTime::parse_from_str(&timestamp, "%Y-%m-%dT%H:%M:%SZ")
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

#[async_trait]
impl SourceResolver for DirectoryListingResolver {
    fn source_name(&self) -> &'static str {
        "directory listing"
    }

    async fn fetch_latest_update(
        &self,
        fetcher: &dyn Fetcher,
        app: App,
        device: &DeviceEnvironment,
        mode: CacheMode,
    ) -> Result<LatestVersion, ResolveError> {
        let abi = select_abi(app, device)?;
        let token = lookup_abi(app, abi, ABI_TOKENS)?;

        let root_url = format!("{}/", self.base_url);
        let root = fetcher
            .fetch_text(&root_url, mode)
            .await
            .map_err(|e| fetch_failed(app, e))?;
        let version = find_latest_version(&root).ok_or_else(|| {
            ResolveError::missing_data(app.id(), format!("no version directory in {}", root_url))
        })?;

        let file_name = self.file_name(token, &version);
        let listing_url = self.build_listing_url(&version, &file_name);
        let listing = fetcher
            .fetch_text(&listing_url, mode)
            .await
            .map_err(|e| fetch_failed(app, e))?;
        if !listing.contains(&file_name) {
            return Err(ResolveError::missing_data(
                app.id(),
                format!("{} is not available on {}", file_name, listing_url),
            ));
        }
        let publish_date = find_publish_date(&listing).ok_or_else(|| {
            ResolveError::missing_data(
                app.id(),
                format!("no creation date for {} on {}", file_name, listing_url),
            )
        })?;

        tracing::debug!(app = app.id(), %version, %abi, "resolved directory listing");

        Ok(LatestVersion::new(
            self.build_download_url(&version, &file_name),
            version,
            publish_date,
        ))
    }
}
