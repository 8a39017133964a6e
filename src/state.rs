//! State persisted between background runs
//!
//! Stored as `state.json` in the cache directory.

use crate::domain::App;
use crate::error::IoError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name below the cache directory
pub const STATE_FILE: &str = "state.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// End of the last completed background check
    pub last_check: Option<DateTime<Utc>>,
    /// Installed version per app id at the last check
    #[serde(default)]
    pub installed_versions: BTreeMap<String, String>,
}

impl RunState {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(STATE_FILE)
    }

    /// Read the state; missing or unreadable state starts over
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), "discarding unreadable state: {}", e);
            Self::default()
        })
    }

    /// Write the state through a temp file
    pub fn save(&self, path: &Path) -> Result<(), IoError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IoError::generic(parent, e))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| IoError::generic(path, std::io::Error::other(e)))?;
        let temp = path.with_extension("json.tmp");
        std::fs::write(&temp, content).map_err(|e| IoError::generic(&temp, e))?;
        std::fs::rename(&temp, path).map_err(|e| IoError::generic(path, e))
    }

    pub fn installed_version(&self, app: App) -> Option<&str> {
        self.installed_versions.get(app.id()).map(String::as_str)
    }

    pub fn record_installed(&mut self, app: App, version: impl Into<String>) {
        self.installed_versions
            .insert(app.id().to_string(), version.into());
    }
}
