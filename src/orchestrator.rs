//! Background orchestrator for one update run
//!
//! This module provides:
//! - Workflow coordination: wait for network → resolve → compare → download → notify
//! - Parallel resolution with a concurrency limit
//! - Download gating on the metered network policy
//! - Per-app error isolation: a failing app never aborts the run
//!
//! A run always completes; failures are reported through the notifier
//! and collected in the `RunOutcome`.

use crate::config::Settings;
use crate::domain::{App, DeviceEnvironment, LatestVersion, UpdateCheckResult};
use crate::download::Pipeline;
use crate::error::{AppError, DownloadError, ResolveError};
use crate::fetch::{CacheMode, Fetcher};
use crate::platform::{Clock, Host, MessageKey, UpdateReport};
use crate::progress::Progress;
use crate::resolve::create_resolver;
use crate::state::RunState;
use crate::version::check_update;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

/// Options of a run that come from the caller rather than the settings
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Bypass the metadata cache
    pub force_refresh: bool,
    /// Resolve only, never download
    pub no_download: bool,
    /// Restrict the run to these apps
    pub only: Vec<App>,
    /// Leave these apps out of the run
    pub exclude: Vec<App>,
    /// Show progress bars
    pub show_progress: bool,
}

impl RunOptions {
    fn includes(&self, app: App) -> bool {
        (self.only.is_empty() || self.only.contains(&app)) && !self.exclude.contains(&app)
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// All steps ran, possibly with per-app failures
    Completed,
    /// No internet connection, nothing was resolved
    Offline,
    /// Another run was still active
    AlreadyRunning,
}

/// Why no download was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadSkip {
    /// Downloads were switched off for this run
    Disabled,
    /// The network is metered and only unmetered downloads are allowed
    MeteredNetwork,
}

/// Result for a single app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    UpToDate,
    UpdateAvailable,
    Downloaded,
    AlreadyDownloaded,
    /// The download did not finish within its wait budget and was cancelled
    DownloadCancelled,
    /// An update exists but its download or verification failed
    DownloadFailed,
    Failed,
    Disabled,
    NotInstalled,
    Incompatible,
}

/// Outcome of a single app in a run
#[derive(Debug, Clone, Serialize)]
pub struct AppOutcome {
    pub app: App,
    pub state: AppState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<LatestVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AppOutcome {
    fn new(app: App, state: AppState) -> Self {
        Self {
            app,
            state,
            installed_version: None,
            latest: None,
            artifact: None,
            error: None,
        }
    }

    pub fn has_update(&self) -> bool {
        matches!(
            self.state,
            AppState::UpdateAvailable
                | AppState::Downloaded
                | AppState::AlreadyDownloaded
                | AppState::DownloadCancelled
                | AppState::DownloadFailed
        )
    }
}

impl AppState {
    /// Resolution or download of the app failed
    pub fn is_failure(self) -> bool {
        matches!(self, AppState::Failed | AppState::DownloadFailed)
    }
}

/// A failure reported during a run
#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<App>,
    pub message: String,
    pub key: MessageKey,
}

/// Result of running the orchestrator
///
/// A run is always reported as a success to its scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads_skipped: Option<DownloadSkip>,
    pub apps: Vec<AppOutcome>,
    pub errors: Vec<RunError>,
}

impl RunOutcome {
    fn new(status: RunStatus, started_at: DateTime<Utc>) -> Self {
        Self {
            status,
            started_at,
            downloads_skipped: None,
            apps: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn updates(&self) -> impl Iterator<Item = &AppOutcome> {
        self.apps.iter().filter(|outcome| outcome.has_update())
    }

    fn app_mut(&mut self, app: App) -> Option<&mut AppOutcome> {
        self.apps.iter_mut().find(|outcome| outcome.app == app)
    }
}

/// Orchestrator for one update run
pub struct Orchestrator {
    settings: Settings,
    options: RunOptions,
    fetcher: Arc<dyn Fetcher>,
    pipeline: Pipeline,
    host: Host,
    /// Held for the duration of a run
    running: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        settings: Settings,
        options: RunOptions,
        fetcher: Arc<dyn Fetcher>,
        pipeline: Pipeline,
        host: Host,
    ) -> Self {
        Self {
            settings,
            options,
            fetcher,
            pipeline,
            host,
            running: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.host.clock
    }

    /// Run the update workflow
    ///
    /// A second call while a run is active returns at once with
    /// `RunStatus::AlreadyRunning`.
    pub async fn run(&self) -> RunOutcome {
        let started_at = self.host.clock.now();
        let Ok(_running) = self.running.try_lock() else {
            tracing::info!("skipping run, another run is active");
            return RunOutcome::new(RunStatus::AlreadyRunning, started_at);
        };

        let mut progress = Progress::new(self.options.show_progress);

        // Step 1: Wait for internet
        progress.spinner("Waiting for network...");
        let online = self
            .wait_until(self.settings.waits.internet_attempts, || {
                self.host.network.is_internet_available()
            })
            .await;
        progress.finish_and_clear();
        if !online {
            tracing::info!("no internet connection, skipping run");
            return RunOutcome::new(RunStatus::Offline, started_at);
        }

        let mut outcome = RunOutcome::new(RunStatus::Completed, started_at);

        // Drop artifacts of apps that are gone
        let installed_apps = self.host.installed.installed();
        if let Err(e) = self
            .pipeline
            .cache()
            .purge_not_installed(&installed_apps)
        {
            self.report(&mut outcome, None, e.into());
        }

        // Step 2: Resolve every eligible app
        let candidates = self.classify(&mut outcome);
        let checks = self.resolve_all(candidates, &mut outcome, &mut progress).await;

        // Steps 3 and 4: Download updates if the network policy allows it
        let updates: Vec<(App, LatestVersion)> = checks
            .into_iter()
            .filter(|(_, check)| check.is_update_available)
            .map(|(app, check)| (app, check.latest))
            .collect();
        if !updates.is_empty() {
            match self.download_gate().await {
                Some(skip) => {
                    tracing::info!(reason = ?skip, "not downloading updates");
                    outcome.downloads_skipped = Some(skip);
                }
                None => self.download_all(updates, &mut outcome, &mut progress).await,
            }
        }

        // Step 5: Report and remember
        let reports: Vec<UpdateReport> = outcome
            .updates()
            .map(|app| UpdateReport {
                app: app.app,
                installed_version: app.installed_version.clone().unwrap_or_default(),
                available_version: app
                    .latest
                    .as_ref()
                    .map(|latest| latest.display_version.clone())
                    .unwrap_or_default(),
                artifact: app.artifact.clone(),
            })
            .collect();
        if !reports.is_empty() {
            self.host.notifier.notify_updates(&reports);
        }
        self.save_state(&mut outcome);

        outcome.apps.sort_by_key(|app| app.app);
        outcome
    }

    /// Poll `check` up to `attempts` times, sleeping between polls
    async fn wait_until<F, Fut>(&self, attempts: u32, check: F) -> bool
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for attempt in 0..attempts.max(1) {
            if check().await {
                return true;
            }
            if attempt + 1 < attempts {
                self.host.clock.sleep(self.settings.waits.poll_interval).await;
            }
        }
        false
    }

    /// Sort out apps that are filtered, disabled, missing or incompatible
    ///
    /// Returns the apps to resolve with their normalized installed version.
    fn classify(&self, outcome: &mut RunOutcome) -> Vec<(App, String)> {
        let device = self.settings.device();
        let mut candidates = Vec::new();

        for app in App::all().iter().copied() {
            if !self.options.includes(app) {
                continue;
            }
            if !self.settings.is_enabled(app) {
                outcome.apps.push(AppOutcome::new(app, AppState::Disabled));
                continue;
            }
            let Some(raw) = self.host.installed.installed_version(app) else {
                outcome.apps.push(AppOutcome::new(app, AppState::NotInstalled));
                continue;
            };
            let installed = app.normalize_installed_version(&raw);
            if !is_compatible(app, &device) {
                tracing::debug!(app = app.id(), "skipping incompatible app");
                let mut skipped = AppOutcome::new(app, AppState::Incompatible);
                skipped.installed_version = Some(installed);
                outcome.apps.push(skipped);
                continue;
            }
            candidates.push((app, installed));
        }
        candidates
    }

    /// Resolve and compare all candidates concurrently
    async fn resolve_all(
        &self,
        candidates: Vec<(App, String)>,
        outcome: &mut RunOutcome,
        progress: &mut Progress,
    ) -> Vec<(App, UpdateCheckResult)> {
        let mode = if self.options.force_refresh {
            CacheMode::ForceRefresh
        } else {
            CacheMode::UseCache
        };
        let device = self.settings.device();
        let semaphore = Arc::new(Semaphore::new(self.settings.resolve_concurrency.max(1)));

        progress.start(candidates.len() as u64, "Checking apps");

        let mut tasks = JoinSet::new();
        let mut pending: Vec<(App, String)> = Vec::new();
        for (app, installed) in candidates {
            pending.push((app, installed.clone()));
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&semaphore);
            let device = device.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let resolver = create_resolver(app);
                tracing::debug!(app = app.id(), source = resolver.source_name(), "resolving");
                let latest = resolver
                    .fetch_latest_update(&*fetcher, app, &device, mode)
                    .await;
                (app, installed, latest)
            });
        }

        let mut checks = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            progress.inc();
            let (app, installed, latest) = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("resolution task failed: {}", e);
                    continue;
                }
            };
            pending.retain(|(pending_app, _)| *pending_app != app);
            progress.set_message(&format!("Checked {}", app));

            let mut app_outcome = AppOutcome::new(app, AppState::UpToDate);
            app_outcome.installed_version = Some(installed.clone());
            match latest {
                Ok(latest) => {
                    let check =
                        check_update(Some(installed.as_str()), latest, app.info().version_scheme);
                    if check.is_update_available {
                        tracing::info!(
                            app = app.id(),
                            installed = %installed,
                            available = %check.latest.version,
                            "update available"
                        );
                        app_outcome.state = AppState::UpdateAvailable;
                    }
                    app_outcome.latest = Some(check.latest.clone());
                    outcome.apps.push(app_outcome);
                    checks.push((app, check));
                }
                Err(e) => {
                    app_outcome.state = AppState::Failed;
                    app_outcome.error = Some(e.to_string());
                    outcome.apps.push(app_outcome);
                    self.report(outcome, Some(app), e.into());
                }
            }
        }
        progress.finish_and_clear();

        // Tasks that panicked never reported back
        for (app, installed) in pending {
            let mut failed = AppOutcome::new(app, AppState::Failed);
            failed.installed_version = Some(installed);
            failed.error = Some("resolution crashed".to_string());
            outcome.apps.push(failed);
            let error = ResolveError::missing_data(app.id(), "resolution crashed");
            self.report(outcome, Some(app), error.into());
        }

        checks
    }

    /// Decide whether downloads may run now
    async fn download_gate(&self) -> Option<DownloadSkip> {
        if self.options.no_download {
            return Some(DownloadSkip::Disabled);
        }
        if !self.settings.only_unmetered {
            return None;
        }
        if !self.host.network.is_unmetered().await {
            return Some(DownloadSkip::MeteredNetwork);
        }
        let unmetered = self
            .wait_until(self.settings.waits.unmetered_attempts, || {
                self.host.network.is_unmetered()
            })
            .await;
        if unmetered {
            None
        } else {
            Some(DownloadSkip::MeteredNetwork)
        }
    }

    /// Download every update, a batch of `download_concurrency` at a time
    async fn download_all(
        &self,
        updates: Vec<(App, LatestVersion)>,
        outcome: &mut RunOutcome,
        progress: &mut Progress,
    ) {
        let cache = self.pipeline.cache();
        let mut queue = Vec::new();
        for (app, latest) in updates {
            if cache.is_downloaded(app, &latest) {
                tracing::debug!(app = app.id(), "update already downloaded");
                if let Some(entry) = outcome.app_mut(app) {
                    entry.state = AppState::AlreadyDownloaded;
                    entry.artifact = Some(cache.artifact_path(app, &latest));
                }
                continue;
            }
            queue.push((app, latest));
        }

        for batch in queue.chunks(self.settings.download_concurrency.max(1)) {
            let mut running = Vec::new();
            for (app, latest) in batch {
                if let Err(e) = self.pipeline.check_storage() {
                    if let Some(entry) = outcome.app_mut(*app) {
                        entry.state = AppState::DownloadFailed;
                    }
                    self.report(outcome, Some(*app), e.into());
                    continue;
                }
                let (handle, status) = self.pipeline.spawn(*app, latest.clone());
                running.push((*app, handle, status));
            }

            for (app, handle, status) in running {
                progress.start_download(None, &format!("Downloading {}", app));
                let finished = self.await_download(handle, status, progress).await;
                progress.finish_and_clear();

                let Some(entry) = outcome.app_mut(app) else {
                    continue;
                };
                match finished {
                    Some(Ok(path)) => {
                        entry.state = AppState::Downloaded;
                        entry.artifact = Some(path);
                    }
                    None | Some(Err(DownloadError::Cancelled)) => {
                        tracing::warn!(app = app.id(), "download cancelled");
                        entry.state = AppState::DownloadCancelled;
                    }
                    Some(Err(e)) => {
                        entry.state = AppState::DownloadFailed;
                        entry.error = Some(e.to_string());
                        self.report(outcome, Some(app), e.into());
                    }
                }
            }
        }
    }

    /// Poll a spawned download until it finishes or the wait budget runs out
    ///
    /// Returns `None` when the download was cancelled for taking too long.
    async fn await_download(
        &self,
        mut handle: tokio::task::JoinHandle<Result<PathBuf, DownloadError>>,
        status: tokio::sync::watch::Receiver<crate::domain::DownloadStatus>,
        progress: &mut Progress,
    ) -> Option<Result<PathBuf, DownloadError>> {
        for _ in 0..self.settings.waits.download_attempts {
            tokio::select! {
                joined = &mut handle => {
                    return Some(match joined {
                        Ok(result) => result,
                        Err(e) if e.is_cancelled() => Err(DownloadError::Cancelled),
                        Err(e) => {
                            tracing::error!("download task failed: {}", e);
                            Err(DownloadError::TaskFailed {
                                message: e.to_string(),
                            })
                        }
                    });
                }
                _ = self.host.clock.sleep(self.settings.waits.poll_interval) => {
                    progress.update_download(&status.borrow());
                }
            }
        }

        handle.abort();
        // Wait for the task to drop, which removes its partial files
        let _ = handle.await;
        None
    }

    /// Persist last check time and installed versions
    fn save_state(&self, outcome: &mut RunOutcome) {
        let path = RunState::path_in(&self.settings.cache_dir());
        let mut state = RunState::load(&path);
        state.last_check = Some(self.host.clock.now());
        for app in &outcome.apps {
            if let Some(version) = &app.installed_version {
                state.record_installed(app.app, version.clone());
            }
        }
        if let Err(e) = state.save(&path) {
            self.report(outcome, None, e.into());
        }
    }

    /// Log, notify and collect a failure
    fn report(&self, outcome: &mut RunOutcome, app: Option<App>, error: AppError) {
        let key = MessageKey::for_error(&error);
        match app {
            Some(app) => tracing::warn!(app = app.id(), %key, "{}", error),
            None => tracing::warn!(%key, "{}", error),
        }
        self.host.notifier.notify_error(&error, key);
        if let Some(app) = app {
            if let Some(entry) = outcome.app_mut(app) {
                entry.error.get_or_insert_with(|| error.to_string());
            }
        }
        outcome.errors.push(RunError {
            app,
            message: error.to_string(),
            key,
        });
    }
}

/// Whether the device can run some build of the app
fn is_compatible(app: App, device: &DeviceEnvironment) -> bool {
    let info = app.info();
    device.api_level >= info.min_api_level && device.best_abi(info.supported_abis).is_some()
}
