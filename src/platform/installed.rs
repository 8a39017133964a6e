//! Installed apps and their versions
//!
//! The reference source is a TOML table of package name to raw version:
//!
//! ```toml
//! "org.torproject.torbrowser" = "102.2.1-Release (11.5.2)"
//! "org.mozilla.klar" = "2021-01-10T12:45:23.396Z"
//! ```

use crate::domain::App;
use crate::error::ConfigError;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Trait for looking up installed apps
pub trait InstalledApps: Send + Sync {
    /// Raw version string of `app`, `None` when not installed
    fn installed_version(&self, app: App) -> Option<String>;

    /// All installed apps of the catalogue
    fn installed(&self) -> Vec<App> {
        App::all()
            .iter()
            .copied()
            .filter(|app| self.installed_version(*app).is_some())
            .collect()
    }
}

/// Installed apps read from a TOML file
#[derive(Debug, Clone, Default)]
pub struct InstalledAppsFile {
    versions: HashMap<App, String>,
}

impl InstalledAppsFile {
    /// Read the file; a missing file means nothing is installed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "installed apps file not found");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::ParseError {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        Self::parse(&content).map_err(|message| ConfigError::ParseError {
            path: path.to_path_buf(),
            message,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        let table: BTreeMap<String, String> = toml::from_str(content).map_err(|e| e.to_string())?;
        let mut versions = HashMap::new();
        for (package, version) in table {
            match App::from_package_name(&package) {
                Some(app) => {
                    versions.insert(app, version);
                }
                None => tracing::debug!(package = %package, "ignoring unknown package"),
            }
        }
        Ok(Self { versions })
    }

    pub fn with_version(mut self, app: App, version: impl Into<String>) -> Self {
        self.versions.insert(app, version.into());
        self
    }
}

impl InstalledApps for InstalledAppsFile {
    fn installed_version(&self, app: App) -> Option<String> {
        self.versions.get(&app).cloned()
    }
}
