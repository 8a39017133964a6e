//! Download and verification of update artifacts
//!
//! This module provides:
//! - The per-app artifact cache (one verified file per app)
//! - Size, hash and archive checks
//! - The pipeline driving one download attempt

mod cache;
mod pipeline;
pub mod verify;

pub use cache::{sanitize, ArtifactCache};
pub use pipeline::{Pipeline, Stage, DEFAULT_MIN_FREE_STORAGE};
