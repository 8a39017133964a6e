//! Per-app artifact slots in the cache directory
//!
//! Layout:
//! - `{root}/{package}_{version}.apk` verified artifact
//! - `{root}/{package}.download` download in progress
//! - `{root}/{package}.extract` package awaiting verification
//!
//! Package and version are sanitized, every non-word character becomes `_`.

use crate::domain::{App, LatestVersion};
use crate::error::IoError;
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of verified artifacts
const ARTIFACT_EXTENSION: &str = "apk";

/// Extension of in-progress downloads
const TEMP_EXTENSION: &str = "download";

/// Extension of packages taken out of an archive, not yet verified
const EXTRACT_EXTENSION: &str = "extract";

/// Replace every character that is not a letter, digit or `_` with `_`
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Artifact cache rooted at a directory
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the cache directory if needed
    pub fn ensure_root(&self) -> Result<(), IoError> {
        fs::create_dir_all(&self.root).map_err(|e| IoError::generic(&self.root, e))
    }

    /// Final location of the verified artifact of `latest`
    pub fn artifact_path(&self, app: App, latest: &LatestVersion) -> PathBuf {
        self.root.join(format!(
            "{}_{}.{}",
            sanitize(app.package_name()),
            sanitize(&latest.version),
            ARTIFACT_EXTENSION
        ))
    }

    /// Location of the download in progress for `app`
    pub fn temp_path(&self, app: App) -> PathBuf {
        self.root
            .join(format!("{}.{}", sanitize(app.package_name()), TEMP_EXTENSION))
    }

    /// Location of the package extracted from a downloaded archive
    pub fn extract_path(&self, app: App) -> PathBuf {
        self.root
            .join(format!("{}.{}", sanitize(app.package_name()), EXTRACT_EXTENSION))
    }

    pub fn is_downloaded(&self, app: App, latest: &LatestVersion) -> bool {
        self.artifact_path(app, latest).is_file()
    }

    /// Remove every cached file of `app`; returns the number removed
    pub fn purge(&self, app: App) -> Result<usize, IoError> {
        self.remove_where(app, |_| true)
    }

    /// Remove every cached file of `app` except the artifact of `latest`
    pub fn purge_except_latest(&self, app: App, latest: &LatestVersion) -> Result<usize, IoError> {
        let keep = self.artifact_path(app, latest);
        self.remove_where(app, |path| path != keep)
    }

    /// Remove the cached files of every app missing from `installed`
    pub fn purge_not_installed(&self, installed: &[App]) -> Result<usize, IoError> {
        let mut removed = 0;
        for app in App::all().iter().filter(|app| !installed.contains(app)) {
            removed += self.purge(*app)?;
        }
        Ok(removed)
    }

    /// Cached files of `app`
    pub fn files_of(&self, app: App) -> Result<Vec<PathBuf>, IoError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(IoError::generic(&self.root, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| IoError::generic(&self.root, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if owner_of(name) == Some(app) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn remove_where(&self, app: App, remove: impl Fn(&Path) -> bool) -> Result<usize, IoError> {
        let mut removed = 0;
        for path in self.files_of(app)? {
            if !remove(&path) {
                continue;
            }
            fs::remove_file(&path).map_err(|e| IoError::generic(&path, e))?;
            tracing::debug!(app = app.id(), path = %path.display(), "removed cached file");
            removed += 1;
        }
        Ok(removed)
    }
}

/// App a cache file name belongs to
///
/// The longest matching package prefix wins, so `org_mozilla_focus_` does
/// not claim the files of a package named `org.mozilla.focus.beta`.
fn owner_of(file_name: &str) -> Option<App> {
    App::all()
        .iter()
        .copied()
        .filter(|app| {
            let package = sanitize(app.package_name());
            let is_artifact = file_name.starts_with(&format!("{}_", package))
                && file_name.ends_with(&format!(".{}", ARTIFACT_EXTENSION));
            is_artifact
                || file_name == format!("{}.{}", package, TEMP_EXTENSION)
                || file_name == format!("{}.{}", package, EXTRACT_EXTENSION)
        })
        .max_by_key(|app| app.package_name().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use tempfile::TempDir;

    fn latest(version: &str) -> LatestVersion {
        let date = DateTime::parse_from_rfc3339("2023-07-04T13:30:00Z").unwrap();
        LatestVersion::new("https://example.org/a.apk", version, date)
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("org.torproject.torbrowser"), "org_torproject_torbrowser");
        assert_eq!(
            sanitize("2021-01-19T21:52:21.911Z"),
            "2021_01_19T21_52_21_911Z"
        );
        assert_eq!(sanitize("already_fine1"), "already_fine1");
    }

    #[test]
    fn test_paths() {
        let cache = ArtifactCache::new("/cache");
        assert_eq!(
            cache.artifact_path(App::TorBrowser, &latest("12.5.1")),
            PathBuf::from("/cache/org_torproject_torbrowser_12_5_1.apk")
        );
        assert_eq!(
            cache.temp_path(App::TorBrowser),
            PathBuf::from("/cache/org_torproject_torbrowser.download")
        );
        assert_eq!(
            cache.extract_path(App::Kiwi),
            PathBuf::from("/cache/com_kiwibrowser_browser.extract")
        );
    }

    #[test]
    fn test_is_downloaded() {
        let dir = TempDir::new().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let latest = latest("12.5.1");

        assert!(!cache.is_downloaded(App::TorBrowser, &latest));
        fs::write(cache.artifact_path(App::TorBrowser, &latest), b"apk").unwrap();
        assert!(cache.is_downloaded(App::TorBrowser, &latest));
    }

    #[test]
    fn test_purge_except_latest() {
        let dir = TempDir::new().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let old = latest("12.0.7");
        let new = latest("12.5.1");
        fs::write(cache.artifact_path(App::TorBrowser, &old), b"old").unwrap();
        fs::write(cache.artifact_path(App::TorBrowser, &new), b"new").unwrap();
        fs::write(cache.temp_path(App::TorBrowser), b"partial").unwrap();
        fs::write(cache.artifact_path(App::Iceraven, &old), b"other").unwrap();

        let removed = cache.purge_except_latest(App::TorBrowser, &new).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(
            cache.files_of(App::TorBrowser).unwrap(),
            vec![cache.artifact_path(App::TorBrowser, &new)]
        );
        assert!(cache.is_downloaded(App::Iceraven, &old));
    }

    #[test]
    fn test_purge() {
        let dir = TempDir::new().unwrap();
        let cache = ArtifactCache::new(dir.path());
        fs::write(cache.artifact_path(App::Kiwi, &latest("1.0")), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"unrelated").unwrap();

        assert_eq!(cache.purge(App::Kiwi).unwrap(), 1);
        assert!(cache.files_of(App::Kiwi).unwrap().is_empty());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_purge_not_installed() {
        let dir = TempDir::new().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let version = latest("1.0");
        fs::write(cache.artifact_path(App::Kiwi, &version), b"a").unwrap();
        fs::write(cache.artifact_path(App::FirefoxFocus, &version), b"b").unwrap();

        let removed = cache.purge_not_installed(&[App::FirefoxFocus]).unwrap();

        assert_eq!(removed, 1);
        assert!(!cache.is_downloaded(App::Kiwi, &version));
        assert!(cache.is_downloaded(App::FirefoxFocus, &version));
    }

    #[test]
    fn test_missing_root_has_no_files() {
        let cache = ArtifactCache::new("/nonexistent/apkup/cache");
        assert!(cache.files_of(App::TorBrowser).unwrap().is_empty());
        assert_eq!(cache.purge(App::TorBrowser).unwrap(), 0);
    }

    #[test]
    fn test_owner_of() {
        assert_eq!(owner_of("org_mozilla_klar_1_0.apk"), Some(App::FirefoxKlar));
        assert_eq!(owner_of("org_mozilla_focus.download"), Some(App::FirefoxFocus));
        assert_eq!(owner_of("com_kiwibrowser_browser.extract"), Some(App::Kiwi));
        assert_eq!(owner_of("org_mozilla_focus_1_0.txt"), None);
        assert_eq!(owner_of("state.json"), None);
    }
}
