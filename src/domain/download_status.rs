//! Progress state of a streaming download

use serde::Serialize;
use std::fmt;

/// Lifecycle of a single download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Running,
    Successful,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Successful => "successful",
            Status::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Snapshot published to progress observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadStatus {
    pub status: Status,
    pub bytes_read: u64,
    /// Content length, when the server sent one
    pub total_bytes: Option<u64>,
}

impl DownloadStatus {
    pub fn pending() -> Self {
        Self {
            status: Status::Pending,
            bytes_read: 0,
            total_bytes: None,
        }
    }

    pub fn running(bytes_read: u64, total_bytes: Option<u64>) -> Self {
        Self {
            status: Status::Running,
            bytes_read,
            total_bytes,
        }
    }

    /// Same counters, terminal status
    pub fn finish(self, success: bool) -> Self {
        Self {
            status: if success {
                Status::Successful
            } else {
                Status::Failed
            },
            ..self
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, Status::Successful | Status::Failed)
    }

    /// Percentage of the download, if the total is known
    pub fn percent(&self) -> Option<u8> {
        match self.total_bytes {
            Some(0) | None => None,
            Some(total) => Some(((self.bytes_read.min(total) * 100) / total) as u8),
        }
    }
}

impl Default for DownloadStatus {
    fn default() -> Self {
        Self::pending()
    }
}
