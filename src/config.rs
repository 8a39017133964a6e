//! Settings file
//!
//! Settings are read once from a TOML file at the start of a run and
//! stay immutable for its duration. A missing default file means
//! defaults; a missing explicit file is an error.
//!
//! ```toml
//! automatic_check = true
//! check_interval = "6h"
//! only_unmetered = true
//! disabled_apps = ["KIWI"]
//! abis = ["arm64-v8a", "armeabi-v7a"]
//! api_level = 34
//!
//! [network]
//! metered = false
//!
//! [waits]
//! download_attempts = 300
//! ```

use crate::domain::{Abi, App, DeviceEnvironment};
use crate::download::DEFAULT_MIN_FREE_STORAGE;
use crate::error::ConfigError;
use crate::fetch::DEFAULT_CACHE_TTL;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name below the platform config and cache directories
const APP_DIR: &str = "apkup";

/// Default check interval (6 hours)
const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Default API level (Android 14)
const DEFAULT_API_LEVEL: u32 = 34;

/// Default connectivity probe
const DEFAULT_PROBE_URL: &str = "https://dist.torproject.org/";

/// Parse duration string in format: Ns, Nmin, Nh, Nd (days), Nw (weeks), Nm (months)
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::InvalidDuration {
        value: s.to_string(),
    };

    // "min" before "m", which means months
    let (num_str, unit_secs) = if let Some(n) = s.strip_suffix("min") {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 60 * 60)
    } else if let Some(n) = s.strip_suffix('d') {
        (n, 24 * 60 * 60)
    } else if let Some(n) = s.strip_suffix('w') {
        (n, 7 * 24 * 60 * 60)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 30 * 24 * 60 * 60)
    } else {
        return Err(invalid());
    };

    let num: u64 = num_str.parse().map_err(|_| invalid())?;
    num.checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

/// Connectivity settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSettings {
    /// URL requested to decide whether the internet is reachable
    pub probe_url: String,
    /// Whether the current connection is metered
    pub metered: bool,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            probe_url: DEFAULT_PROBE_URL.to_string(),
            metered: false,
        }
    }
}

/// Bounded waits of a background run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaitSettings {
    /// Pause between two polls
    #[serde(deserialize_with = "deserialize_duration")]
    pub poll_interval: Duration,
    /// Polls for internet reachability
    pub internet_attempts: u32,
    /// Polls for an unmetered network
    pub unmetered_attempts: u32,
    /// Polls of a running download before it is cancelled
    pub download_attempts: u32,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            internet_attempts: 10,
            unmetered_attempts: 60,
            download_attempts: 300,
        }
    }
}

/// Settings of the updater
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Whether the recurring background check runs at all
    pub automatic_check: bool,
    #[serde(deserialize_with = "deserialize_duration")]
    pub check_interval: Duration,
    /// Download only on unmetered networks
    pub only_unmetered: bool,
    pub disabled_apps: Vec<App>,
    pub prefer_32bit: bool,
    /// Device ABIs in order of preference
    pub abis: Vec<Abi>,
    pub api_level: u32,
    pub cache_dir: Option<PathBuf>,
    /// TOML file mapping package names to installed versions
    pub installed_apps_file: Option<PathBuf>,
    pub min_free_storage_mb: u64,
    /// Freshness window of fetched metadata
    #[serde(deserialize_with = "deserialize_duration")]
    pub cache_ttl: Duration,
    /// Apps resolved at the same time
    pub resolve_concurrency: usize,
    /// Apps downloaded at the same time
    pub download_concurrency: usize,
    pub network: NetworkSettings,
    pub waits: WaitSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            automatic_check: true,
            check_interval: DEFAULT_CHECK_INTERVAL,
            only_unmetered: true,
            disabled_apps: Vec::new(),
            prefer_32bit: false,
            abis: Abi::for_arch(std::env::consts::ARCH),
            api_level: DEFAULT_API_LEVEL,
            cache_dir: None,
            installed_apps_file: None,
            min_free_storage_mb: DEFAULT_MIN_FREE_STORAGE / (1024 * 1024),
            cache_ttl: DEFAULT_CACHE_TTL,
            resolve_concurrency: 4,
            download_concurrency: 1,
            network: NetworkSettings::default(),
            waits: WaitSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Read settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content).map_err(|message| ConfigError::ParseError {
            path: path.to_path_buf(),
            message,
        })
    }

    fn from_toml(content: &str) -> Result<Self, String> {
        let settings: Settings = toml::from_str(content).map_err(|e| e.to_string())?;
        if settings.resolve_concurrency == 0 || settings.download_concurrency == 0 {
            return Err("concurrency must be at least 1".to_string());
        }
        Ok(settings)
    }

    pub fn is_enabled(&self, app: App) -> bool {
        !self.disabled_apps.contains(&app)
    }

    pub fn device(&self) -> DeviceEnvironment {
        DeviceEnvironment::new(self.abis.clone(), self.api_level)
            .with_prefer_32bit(self.prefer_32bit)
    }

    pub fn min_free_storage_bytes(&self) -> u64 {
        self.min_free_storage_mb.saturating_mul(1024 * 1024)
    }

    /// Artifact cache directory
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_DIR)
        })
    }

    /// File listing the installed apps
    pub fn installed_apps_file(&self) -> PathBuf {
        self.installed_apps_file.clone().unwrap_or_else(|| {
            config_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("installed.toml")
        })
    }
}

fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

/// Default settings file, `<config dir>/apkup/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
