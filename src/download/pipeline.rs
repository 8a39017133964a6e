//! Download and verify pipeline
//!
//! One attempt moves through
//! `Idle -> Downloading -> Downloaded -> Verifying -> Ready | Invalid`.
//! The download lands in the app's temp slot and only a verified package
//! ever reaches the final slot. Temp and unverified files are removed on
//! every exit path, including cancellation of the attempt.

use crate::domain::{App, DownloadStatus, LatestVersion};
use crate::download::{verify, ArtifactCache};
use crate::error::{DownloadError, IoError};
use crate::fetch::{Fetcher, PartialFile};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default minimum free space in the cache directory (300 MiB)
pub const DEFAULT_MIN_FREE_STORAGE: u64 = 300 * 1024 * 1024;

/// Stage of a download attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Downloading,
    Downloaded,
    Verifying,
    Ready,
    Invalid,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Idle => "idle",
            Stage::Downloading => "downloading",
            Stage::Downloaded => "downloaded",
            Stage::Verifying => "verifying",
            Stage::Ready => "ready",
            Stage::Invalid => "invalid",
        };
        write!(f, "{}", label)
    }
}

/// Turns a resolved version into a verified artifact in the cache
#[derive(Clone)]
pub struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    cache: ArtifactCache,
    min_free_storage: u64,
    in_flight: Arc<Mutex<HashSet<App>>>,
}

/// Marks an app as downloading until dropped
struct InFlight {
    app: App,
    apps: Arc<Mutex<HashSet<App>>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Ok(mut apps) = self.apps.lock() {
            apps.remove(&self.app);
        }
    }
}

/// Logs stage transitions of one attempt
struct Attempt {
    app: App,
    stage: Stage,
}

impl Attempt {
    fn enter(&mut self, next: Stage) {
        tracing::debug!(app = self.app.id(), from = %self.stage, to = %next, "download stage");
        self.stage = next;
    }
}

impl Pipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: ArtifactCache) -> Self {
        Self {
            fetcher,
            cache,
            min_free_storage: DEFAULT_MIN_FREE_STORAGE,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_min_free_storage(mut self, bytes: u64) -> Self {
        self.min_free_storage = bytes;
        self
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Whether the app has an attempt in `Downloading` or `Verifying`
    pub fn is_in_progress(&self, app: App) -> bool {
        self.in_flight
            .lock()
            .map(|apps| apps.contains(&app))
            .unwrap_or(false)
    }

    /// Fail unless the cache directory has the configured free space
    pub fn check_storage(&self) -> Result<(), DownloadError> {
        self.cache.ensure_root()?;
        let root = self.cache.root();
        let available = fs4::available_space(root).map_err(|e| IoError::generic(root, e))?;
        if available < self.min_free_storage {
            return Err(DownloadError::InsufficientStorage {
                path: root.to_path_buf(),
                available,
                required: self.min_free_storage,
            });
        }
        Ok(())
    }

    /// Download, verify and place the artifact of `latest`
    ///
    /// Returns the path of the verified artifact. The last value sent on
    /// `progress` is terminal.
    pub async fn download(
        &self,
        app: App,
        latest: &LatestVersion,
        progress: &watch::Sender<DownloadStatus>,
    ) -> Result<PathBuf, DownloadError> {
        let _in_flight = self.begin(app)?;
        progress.send_replace(DownloadStatus::running(
            0,
            latest.exact_file_size_bytes_of_download,
        ));

        let result = self.attempt(app, latest, progress).await;

        let last = *progress.borrow();
        progress.send_replace(last.finish(result.is_ok()));
        if let Err(e) = &result {
            tracing::warn!(app = app.id(), version = %latest.version, "download failed: {}", e);
        }
        result
    }

    /// Run `download` on a task
    ///
    /// Aborting the handle cancels the attempt and cleans up its files.
    pub fn spawn(
        &self,
        app: App,
        latest: LatestVersion,
    ) -> (
        JoinHandle<Result<PathBuf, DownloadError>>,
        watch::Receiver<DownloadStatus>,
    ) {
        let (tx, rx) = watch::channel(DownloadStatus::pending());
        let pipeline = self.clone();
        let handle = tokio::spawn(async move { pipeline.download(app, &latest, &tx).await });
        (handle, rx)
    }

    fn begin(&self, app: App) -> Result<InFlight, DownloadError> {
        let mut apps = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !apps.insert(app) {
            return Err(DownloadError::AlreadyInProgress {
                package: app.package_name().to_string(),
            });
        }
        Ok(InFlight {
            app,
            apps: Arc::clone(&self.in_flight),
        })
    }

    async fn attempt(
        &self,
        app: App,
        latest: &LatestVersion,
        progress: &watch::Sender<DownloadStatus>,
    ) -> Result<PathBuf, DownloadError> {
        let mut attempt = Attempt {
            app,
            stage: Stage::Idle,
        };

        self.check_storage()?;

        let temp = self.cache.temp_path(app);
        let temp_guard = PartialFile::new(&temp);

        attempt.enter(Stage::Downloading);
        let bytes = self
            .fetcher
            .download_file(&latest.download_url, &temp, progress)
            .await;
        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(e) => {
                attempt.enter(Stage::Invalid);
                return Err(e.into());
            }
        };
        attempt.enter(Stage::Downloaded);

        attempt.enter(Stage::Verifying);
        let placed = run_blocking({
            let cache = self.cache.clone();
            let latest = latest.clone();
            // Blocking work outlives a cancelled attempt, so it owns the guard
            move || {
                let final_path = verify_and_place(&cache, app, &latest, &temp, bytes)?;
                drop(temp_guard);
                Ok(final_path)
            }
        })
        .await;
        let final_path = match placed {
            Ok(path) => path,
            Err(e) => {
                attempt.enter(Stage::Invalid);
                return Err(e);
            }
        };
        attempt.enter(Stage::Ready);

        tracing::info!(app = app.id(), path = %final_path.display(), "artifact ready");
        Ok(final_path)
    }
}

/// Verify the temp download and move the package to the final slot
///
/// The final slot is only ever written by an atomic rename of a verified
/// package, followed by eviction of the app's other files.
fn verify_and_place(
    cache: &ArtifactCache,
    app: App,
    latest: &LatestVersion,
    temp: &Path,
    bytes: u64,
) -> Result<PathBuf, DownloadError> {
    verify::check_size(latest.exact_file_size_bytes_of_download, bytes)?;
    verify::check_hash(temp, latest.file_hash.as_deref())?;

    let (package, _extract_guard) = match app.info().file_name_in_zip_archive {
        Some(entry) => {
            let extracted = cache.extract_path(app);
            let guard = PartialFile::new(&extracted);
            verify::extract_entry(temp, entry, &extracted)?;
            (extracted, Some(guard))
        }
        None => (temp.to_path_buf(), None),
    };
    verify::check_package(&package)?;

    let final_path = cache.artifact_path(app, latest);
    std::fs::rename(&package, &final_path).map_err(|e| IoError::generic(&final_path, e))?;

    if let Err(e) = cache.purge_except_latest(app, latest) {
        tracing::warn!(app = app.id(), "failed to evict old artifacts: {}", e);
    }
    Ok(final_path)
}

/// Run blocking file work off the async runtime
async fn run_blocking<T, F>(work: F) -> Result<T, DownloadError>
where
    F: FnOnce() -> Result<T, DownloadError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(DownloadError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Status;
    use crate::download::verify::testing::{apk_bytes, zip_bytes};
    use crate::download::verify::sha256_file;
    use crate::fetch::testing::FakeFetcher;
    use chrono::DateTime;
    use tempfile::TempDir;

    const URL: &str = "https://example.org/app.apk";

    fn latest(version: &str) -> LatestVersion {
        let date = DateTime::parse_from_rfc3339("2023-07-04T13:30:00Z").unwrap();
        LatestVersion::new(URL, version, date)
    }

    fn pipeline(dir: &TempDir, fetcher: FakeFetcher) -> Pipeline {
        Pipeline::new(Arc::new(fetcher), ArtifactCache::new(dir.path())).with_min_free_storage(0)
    }

    #[tokio::test]
    async fn test_download_plain_apk() {
        let dir = TempDir::new().unwrap();
        let apk = apk_bytes("tor");
        let latest = latest("12.5.1").with_size(apk.len() as u64);
        let pipeline = pipeline(&dir, FakeFetcher::new().with_file(URL, apk.clone()));
        let (tx, rx) = watch::channel(DownloadStatus::pending());

        let path = pipeline.download(App::TorBrowser, &latest, &tx).await.unwrap();

        assert_eq!(path, pipeline.cache().artifact_path(App::TorBrowser, &latest));
        assert_eq!(std::fs::read(&path).unwrap(), apk);
        assert!(pipeline.cache().is_downloaded(App::TorBrowser, &latest));
        assert!(!pipeline.cache().temp_path(App::TorBrowser).exists());
        assert_eq!(rx.borrow().status, Status::Successful);
        assert!(!pipeline.is_in_progress(App::TorBrowser));
    }

    #[tokio::test]
    async fn test_size_mismatch_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let apk = apk_bytes("tor");
        let latest = latest("12.5.1").with_size(apk.len() as u64 + 1);
        let pipeline = pipeline(&dir, FakeFetcher::new().with_file(URL, apk));
        let (tx, rx) = watch::channel(DownloadStatus::pending());

        let err = pipeline
            .download(App::TorBrowser, &latest, &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::SizeMismatch { .. }));
        assert!(!pipeline.cache().is_downloaded(App::TorBrowser, &latest));
        assert!(pipeline.cache().files_of(App::TorBrowser).unwrap().is_empty());
        assert_eq!(rx.borrow().status, Status::Failed);
    }

    #[tokio::test]
    async fn test_hash_verified() {
        let dir = TempDir::new().unwrap();
        let apk = apk_bytes("klar");
        let hash_dir = TempDir::new().unwrap();
        let reference = hash_dir.path().join("ref");
        std::fs::write(&reference, &apk).unwrap();
        let hash = sha256_file(&reference).unwrap();

        let pipeline = pipeline(&dir, FakeFetcher::new().with_file(URL, apk));
        let (tx, _rx) = watch::channel(DownloadStatus::pending());

        let good = latest("2021-01-19T21:52:21.911Z").with_hash(hash.to_uppercase());
        assert!(pipeline.download(App::FirefoxKlar, &good, &tx).await.is_ok());

        let bad = latest("2021-01-20T21:52:21.911Z").with_hash("00".repeat(32));
        let err = pipeline
            .download(App::FirefoxKlar, &bad, &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::HashMismatch { .. }));
        // The previous verified artifact is untouched
        assert_eq!(
            pipeline.cache().files_of(App::FirefoxKlar).unwrap(),
            vec![pipeline.cache().artifact_path(App::FirefoxKlar, &good)]
        );
    }

    #[tokio::test]
    async fn test_zip_packaged_app_extracts_entry() {
        let dir = TempDir::new().unwrap();
        let apk = apk_bytes("kiwi");
        let archive = zip_bytes(&[("ChromePublic.apk", &apk), ("LICENSE", b"bsd")]);
        let pipeline = pipeline(&dir, FakeFetcher::new().with_file(URL, archive));
        let (tx, _rx) = watch::channel(DownloadStatus::pending());
        let latest = latest("124.0.6327.4");

        let path = pipeline.download(App::Kiwi, &latest, &tx).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), apk);
        assert!(!pipeline.cache().temp_path(App::Kiwi).exists());
    }

    #[tokio::test]
    async fn test_zip_without_entry_fails() {
        let dir = TempDir::new().unwrap();
        let archive = zip_bytes(&[("LICENSE", b"bsd")]);
        let pipeline = pipeline(&dir, FakeFetcher::new().with_file(URL, archive));
        let (tx, _rx) = watch::channel(DownloadStatus::pending());

        let err = pipeline
            .download(App::Kiwi, &latest("124.0"), &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::MissingArchiveEntry { .. }));
        assert!(pipeline.cache().files_of(App::Kiwi).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_artifact_discarded() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(
            &dir,
            FakeFetcher::new().with_file(URL, b"<html>502</html>".to_vec()),
        );
        let (tx, _rx) = watch::channel(DownloadStatus::pending());

        let err = pipeline
            .download(App::Iceraven, &latest("2.10.0"), &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::CorruptArtifact { .. }));
        assert!(pipeline.cache().files_of(App::Iceraven).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zip_with_corrupt_package_discarded() {
        let dir = TempDir::new().unwrap();
        let archive = zip_bytes(&[("ChromePublic.apk", b"not a package")]);
        let pipeline = pipeline(&dir, FakeFetcher::new().with_file(URL, archive));
        let (tx, _rx) = watch::channel(DownloadStatus::pending());
        let latest = latest("124.0.6327.4");

        let err = pipeline.download(App::Kiwi, &latest, &tx).await.unwrap_err();

        assert!(matches!(err, DownloadError::CorruptArtifact { .. }));
        assert!(!pipeline.cache().is_downloaded(App::Kiwi, &latest));
        assert!(!pipeline.cache().extract_path(App::Kiwi).exists());
        assert!(pipeline.cache().files_of(App::Kiwi).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_download_keeps_cached_artifact() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, FakeFetcher::new());
        let (tx, _rx) = watch::channel(DownloadStatus::pending());
        let latest = latest("12.5.1");
        let cached = pipeline.cache().artifact_path(App::TorBrowser, &latest);
        std::fs::write(&cached, apk_bytes("tor")).unwrap();

        let err = pipeline
            .download(App::TorBrowser, &latest, &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Network(_)));
        assert!(pipeline.cache().is_downloaded(App::TorBrowser, &latest));
        assert_eq!(std::fs::read(&cached).unwrap(), apk_bytes("tor"));
    }

    #[tokio::test]
    async fn test_failed_verification_keeps_cached_artifact() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(
            &dir,
            FakeFetcher::new().with_file(URL, b"<html>502</html>".to_vec()),
        );
        let (tx, _rx) = watch::channel(DownloadStatus::pending());
        let latest = latest("2.10.0");
        let cached = pipeline.cache().artifact_path(App::Iceraven, &latest);
        std::fs::write(&cached, apk_bytes("iceraven")).unwrap();

        let err = pipeline
            .download(App::Iceraven, &latest, &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::CorruptArtifact { .. }));
        assert_eq!(std::fs::read(&cached).unwrap(), apk_bytes("iceraven"));
        assert_eq!(pipeline.cache().files_of(App::Iceraven).unwrap(), vec![cached]);
    }

    #[tokio::test]
    async fn test_newer_download_supersedes_old() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, FakeFetcher::new().with_file(URL, apk_bytes("tor")));
        let (tx, _rx) = watch::channel(DownloadStatus::pending());
        let old = latest("12.0.7");
        let new = latest("12.5.1");

        pipeline.download(App::TorBrowser, &old, &tx).await.unwrap();
        pipeline.download(App::TorBrowser, &new, &tx).await.unwrap();

        assert_eq!(
            pipeline.cache().files_of(App::TorBrowser).unwrap(),
            vec![pipeline.cache().artifact_path(App::TorBrowser, &new)]
        );
    }

    #[tokio::test]
    async fn test_network_error() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, FakeFetcher::new());
        let (tx, _rx) = watch::channel(DownloadStatus::pending());

        let err = pipeline
            .download(App::TorBrowser, &latest("12.5.1"), &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Network(_)));
        assert!(!pipeline.is_in_progress(App::TorBrowser));
    }

    #[tokio::test]
    async fn test_already_in_progress() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, FakeFetcher::new());
        let _held = pipeline.begin(App::TorBrowser).unwrap();
        let (tx, _rx) = watch::channel(DownloadStatus::pending());

        let err = pipeline
            .download(App::TorBrowser, &latest("12.5.1"), &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::AlreadyInProgress { .. }));
        // Another app is not blocked
        assert!(pipeline.begin(App::Kiwi).is_ok());
    }

    #[tokio::test]
    async fn test_insufficient_storage() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(
            Arc::new(FakeFetcher::new().with_file(URL, apk_bytes("tor"))),
            ArtifactCache::new(dir.path()),
        )
        .with_min_free_storage(u64::MAX);
        let (tx, _rx) = watch::channel(DownloadStatus::pending());

        let err = pipeline
            .download(App::TorBrowser, &latest("12.5.1"), &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::InsufficientStorage { .. }));
        assert!(pipeline.cache().files_of(App::TorBrowser).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_reports_progress() {
        let dir = TempDir::new().unwrap();
        let apk = apk_bytes("tor");
        let pipeline = pipeline(&dir, FakeFetcher::new().with_file(URL, apk.clone()));

        let (handle, rx) = pipeline.spawn(App::TorBrowser, latest("12.5.1"));
        let path = handle.await.unwrap().unwrap();

        assert!(path.exists());
        let status = *rx.borrow();
        assert_eq!(status.status, Status::Successful);
        assert_eq!(status.bytes_read, apk.len() as u64);
    }

    #[test]
    fn test_placement_evicts_older_artifacts() {
        let dir = TempDir::new().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let old = latest("124.0.6327.3");
        let new = latest("124.0.6327.4");
        std::fs::write(cache.artifact_path(App::Kiwi, &old), apk_bytes("old")).unwrap();
        let archive = zip_bytes(&[("ChromePublic.apk", &apk_bytes("kiwi"))]);
        let temp = cache.temp_path(App::Kiwi);
        std::fs::write(&temp, &archive).unwrap();

        let placed = verify_and_place(&cache, App::Kiwi, &new, &temp, archive.len() as u64).unwrap();

        assert_eq!(placed, cache.artifact_path(App::Kiwi, &new));
        assert_eq!(cache.files_of(App::Kiwi).unwrap(), vec![placed]);
        assert!(!cache.extract_path(App::Kiwi).exists());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Downloading.to_string(), "downloading");
        assert_eq!(Stage::Invalid.to_string(), "invalid");
    }
}
