//! CLI argument parsing module for apkup

use crate::domain::App;
use crate::orchestrator::RunOptions;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Update checker and downloader for Android apps
#[derive(Parser, Debug, Clone)]
#[command(
    name = "apkup",
    version,
    about = "Update checker and downloader for Android apps"
)]
pub struct CliArgs {
    /// Settings file (default: <config dir>/apkup/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for downloaded artifacts and run state
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    // Run options
    /// Ignore cached release metadata
    #[arg(long)]
    pub force_refresh: bool,

    /// Only check for updates, never download
    #[arg(long)]
    pub no_download: bool,

    /// Keep running and check again after every check interval
    #[arg(long)]
    pub watch: bool,

    // App filters
    /// Check only these apps (can be specified multiple times)
    #[arg(long, action = ArgAction::Append)]
    pub only: Vec<App>,

    /// Leave these apps out (can be specified multiple times)
    #[arg(long, action = ArgAction::Append)]
    pub exclude: Vec<App>,

    // Maintenance
    /// Delete all downloaded artifacts and exit
    #[arg(long, conflicts_with = "watch")]
    pub purge: bool,

    /// List the supported apps and exit
    #[arg(long)]
    pub list_apps: bool,

    // Output options
    /// Output results in JSON format
    #[arg(long)]
    pub json: bool,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,

    /// Enable quiet mode - minimal output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl CliArgs {
    /// Options for the orchestrator derived from the flags
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            force_refresh: self.force_refresh,
            no_download: self.no_download,
            only: self.only.clone(),
            exclude: self.exclude.clone(),
            show_progress: !self.quiet && !self.json,
        }
    }
}
