//! Core domain models for apkup
//!
//! This module contains the fundamental types used throughout the application:
//! - App catalogue with per-app sources and version schemes
//! - ABI types and the device environment
//! - Resolved latest versions and update check results
//! - Download progress snapshots

mod abi;
mod app;
mod download_status;
mod latest_version;

pub use abi::{Abi, DeviceEnvironment};
pub use app::{App, AppInfo, Source, VersionScheme};
pub use download_status::{DownloadStatus, Status};
pub use latest_version::{LatestVersion, UpdateCheckResult};
