//! apkup - update checker and downloader for Android apps
//!
//! This library provides the update pipeline for a fixed catalogue of
//! sideloaded apps:
//! - Cached fetching of release metadata
//! - Source resolvers (directory listings, Mozilla CI, GitHub releases)
//! - Version comparison per app scheme
//! - Download and verification of artifacts
//! - A background orchestrator and its periodic scheduler

pub mod cli;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod fetch;
pub mod orchestrator;
pub mod output;
pub mod platform;
pub mod progress;
pub mod resolve;
pub mod scheduler;
pub mod state;
pub mod version;
