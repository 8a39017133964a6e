//! User notifications of a background run

use crate::domain::App;
use crate::error::AppError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Message shown for a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    /// The network failed, retrying later may help
    NetworkIssue,
    /// Anything else
    UnknownBug,
}

impl MessageKey {
    pub fn for_error(error: &AppError) -> Self {
        if error.is_network() {
            MessageKey::NetworkIssue
        } else {
            MessageKey::UnknownBug
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKey::NetworkIssue => write!(f, "network issue"),
            MessageKey::UnknownBug => write!(f, "unknown bug"),
        }
    }
}

/// An app with a pending or downloaded update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub app: App,
    pub installed_version: String,
    pub available_version: String,
    /// Verified artifact, if it was downloaded
    pub artifact: Option<PathBuf>,
}

/// Trait for surfacing run results to the user
pub trait Notifier: Send + Sync {
    fn notify_updates(&self, reports: &[UpdateReport]);

    fn notify_error(&self, error: &AppError, key: MessageKey);
}

/// Notifier writing to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_updates(&self, reports: &[UpdateReport]) {
        for report in reports {
            match &report.artifact {
                Some(path) => tracing::info!(
                    app = report.app.id(),
                    version = %report.available_version,
                    path = %path.display(),
                    "update downloaded"
                ),
                None => tracing::info!(
                    app = report.app.id(),
                    version = %report.available_version,
                    "update available"
                ),
            }
        }
    }

    fn notify_error(&self, error: &AppError, key: MessageKey) {
        tracing::error!(%key, "{}", error);
    }
}
