//! JSON output formatter for machine processing

use crate::orchestrator::{AppOutcome, DownloadSkip, RunError, RunOutcome, RunStatus};
use crate::output::{OutputFormatter, Verbosity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

/// JSON formatter for machine-readable output
pub struct JsonFormatter {
    /// Verbose output lists every app, otherwise only updates and failures
    verbosity: Verbosity,
}

impl JsonFormatter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }
}

/// JSON representation of a run
#[derive(Serialize)]
struct JsonOutput<'a> {
    status: RunStatus,
    started_at: DateTime<Utc>,
    summary: JsonSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    downloads_skipped: Option<DownloadSkip>,
    apps: Vec<&'a AppOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<&'a RunError>,
}

/// JSON representation of summary statistics
#[derive(Serialize)]
struct JsonSummary {
    checked: usize,
    updates: usize,
    downloaded: usize,
    failed: usize,
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, outcome: &RunOutcome, writer: &mut dyn Write) -> std::io::Result<()> {
        let summary = JsonSummary {
            checked: outcome
                .apps
                .iter()
                .filter(|app| app.latest.is_some())
                .count(),
            updates: outcome.updates().count(),
            downloaded: outcome
                .updates()
                .filter(|app| app.artifact.is_some())
                .count(),
            failed: outcome
                .apps
                .iter()
                .filter(|app| app.state.is_failure())
                .count(),
        };

        let apps = outcome
            .apps
            .iter()
            .filter(|app| {
                self.verbosity == Verbosity::Verbose
                    || app.has_update()
                    || app.state.is_failure()
            })
            .collect();

        let output = JsonOutput {
            status: outcome.status,
            started_at: outcome.started_at,
            summary,
            downloads_skipped: outcome.downloads_skipped,
            apps,
            errors: outcome.errors.iter().collect(),
        };

        serde_json::to_writer_pretty(&mut *writer, &output)?;
        writeln!(writer)
    }
}
