//! Text output formatter for human-readable display
//!
//! Updates come first with their artifact, then failures, then (verbose
//! only) every other app with its state.

use crate::orchestrator::{AppOutcome, AppState, DownloadSkip, RunOutcome, RunStatus};
use crate::output::{OutputFormatter, Verbosity};
use colored::Colorize;
use std::io::Write;

/// Text formatter for human-readable output
pub struct TextFormatter {
    verbosity: Verbosity,
    /// Whether to use colors
    color: bool,
}

impl TextFormatter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            color: true,
        }
    }

    pub fn with_color(verbosity: Verbosity, color: bool) -> Self {
        Self { verbosity, color }
    }

    /// Short label of an app state
    fn state_label(&self, state: AppState) -> &'static str {
        match state {
            AppState::UpToDate => "up to date",
            AppState::UpdateAvailable => "update available",
            AppState::Downloaded => "downloaded",
            AppState::AlreadyDownloaded => "already downloaded",
            AppState::DownloadCancelled => "download cancelled",
            AppState::DownloadFailed => "download failed",
            AppState::Failed => "failed",
            AppState::Disabled => "disabled",
            AppState::NotInstalled => "not installed",
            AppState::Incompatible => "incompatible",
        }
    }

    fn max_name_length(&self, apps: &[&AppOutcome]) -> usize {
        apps.iter()
            .map(|outcome| outcome.app.to_string().len())
            .max()
            .unwrap_or(0)
    }

    /// Format a single update line
    fn format_update_line(
        &self,
        outcome: &AppOutcome,
        max_name_len: usize,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        let name = format!("{:width$}", outcome.app.to_string(), width = max_name_len);
        let installed = outcome.installed_version.as_deref().unwrap_or("?");
        let available = outcome
            .latest
            .as_ref()
            .map(|latest| latest.display_version.as_str())
            .unwrap_or("?");
        let label = self.state_label(outcome.state);

        if self.color {
            let label = match outcome.state {
                AppState::Downloaded | AppState::AlreadyDownloaded => label.green(),
                AppState::DownloadCancelled => label.yellow(),
                AppState::DownloadFailed => label.red(),
                _ => label.cyan(),
            };
            writeln!(
                writer,
                "  {} {} {} {} [{}]",
                name,
                installed.dimmed(),
                "→".dimmed(),
                available.bright_white().bold(),
                label
            )?;
        } else {
            writeln!(
                writer,
                "  {} {} -> {} [{}]",
                name, installed, available, label
            )?;
        }

        if let Some(ref artifact) = outcome.artifact {
            let path = artifact.display().to_string();
            if self.color {
                writeln!(writer, "    {}", path.dimmed())?;
            } else {
                writeln!(writer, "    {}", path)?;
            }
        }
        if let Some(ref error) = outcome.error {
            if self.color {
                writeln!(writer, "    {}", error.red())?;
            } else {
                writeln!(writer, "    {}", error)?;
            }
        }
        Ok(())
    }

    /// Format an app that is not an update
    fn format_state_line(
        &self,
        outcome: &AppOutcome,
        max_name_len: usize,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        let name = format!("{:width$}", outcome.app.to_string(), width = max_name_len);
        let detail = match (&outcome.error, &outcome.installed_version) {
            (Some(error), _) => format!("{}: {}", self.state_label(outcome.state), error),
            (None, Some(version)) => format!("{} {}", self.state_label(outcome.state), version),
            (None, None) => self.state_label(outcome.state).to_string(),
        };

        if !self.color {
            return writeln!(writer, "  {} ({})", name, detail);
        }
        if outcome.state == AppState::Failed {
            writeln!(writer, "  {} {}", name.red(), format!("({})", detail).red())
        } else {
            writeln!(
                writer,
                "  {} {}",
                name.dimmed(),
                format!("({})", detail).dimmed()
            )
        }
    }

    fn format_heading(&self, title: &str, writer: &mut dyn Write) -> std::io::Result<()> {
        if self.color {
            writeln!(writer, "{}", title.bold())
        } else {
            writeln!(writer, "{}", title)
        }
    }

    fn format_skip_note(&self, skip: DownloadSkip, writer: &mut dyn Write) -> std::io::Result<()> {
        let note = match skip {
            DownloadSkip::Disabled => "Downloads disabled for this run",
            DownloadSkip::MeteredNetwork => "Downloads postponed, network is metered",
        };
        if self.color {
            writeln!(writer, "{}", note.yellow())
        } else {
            writeln!(writer, "{}", note)
        }
    }

    fn format_summary(&self, outcome: &RunOutcome, writer: &mut dyn Write) -> std::io::Result<()> {
        let updates = outcome.updates().count();
        let downloaded = outcome
            .updates()
            .filter(|app| app.artifact.is_some())
            .count();
        let failed = outcome
            .apps
            .iter()
            .filter(|app| app.state.is_failure())
            .count();

        if self.verbosity == Verbosity::Quiet {
            return writeln!(
                writer,
                "{} update(s), {} downloaded, {} failed",
                updates, downloaded, failed
            );
        }

        writeln!(writer)?;
        if updates == 0 && failed == 0 {
            if self.color {
                writeln!(writer, "{}", "All apps are up to date.".green())?;
            } else {
                writeln!(writer, "All apps are up to date.")?;
            }
            return Ok(());
        }

        self.format_heading("Summary:", writer)?;
        writeln!(writer, "  {} update(s) available", updates)?;
        writeln!(writer, "  {} artifact(s) ready to install", downloaded)?;
        if failed > 0 {
            let line = format!("  {} app(s) failed", failed);
            if self.color {
                writeln!(writer, "{}", line.red())?;
            } else {
                writeln!(writer, "{}", line)?;
            }
        }
        Ok(())
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, outcome: &RunOutcome, writer: &mut dyn Write) -> std::io::Result<()> {
        match outcome.status {
            RunStatus::Offline => {
                return writeln!(writer, "No internet connection, nothing was checked.");
            }
            RunStatus::AlreadyRunning => {
                return writeln!(writer, "Another run is still active, skipped.");
            }
            RunStatus::Completed => {}
        }

        let updates: Vec<&AppOutcome> = outcome.updates().collect();
        let others: Vec<&AppOutcome> = outcome
            .apps
            .iter()
            .filter(|app| !app.has_update())
            .filter(|app| {
                self.verbosity == Verbosity::Verbose
                    || (self.verbosity == Verbosity::Normal && app.state == AppState::Failed)
            })
            .collect();
        let max_name_len = self
            .max_name_length(&updates)
            .max(self.max_name_length(&others))
            .max(16);

        if !updates.is_empty() {
            self.format_heading("Updates:", writer)?;
            for app in &updates {
                self.format_update_line(app, max_name_len, writer)?;
            }
        }
        if let Some(skip) = outcome.downloads_skipped {
            self.format_skip_note(skip, writer)?;
        }

        if !others.is_empty() {
            if !updates.is_empty() {
                writeln!(writer)?;
            }
            self.format_heading("Other apps:", writer)?;
            for app in &others {
                self.format_state_line(app, max_name_len, writer)?;
            }
        }

        // Errors without an app, like a failed cache cleanup
        if self.verbosity != Verbosity::Quiet {
            for error in outcome.errors.iter().filter(|error| error.app.is_none()) {
                writeln!(writer, "Error ({}): {}", error.key, error.message)?;
            }
        }

        self.format_summary(outcome, writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::App;
    use crate::output::testing::sample_outcome;
    use crate::platform::MessageKey;
    use crate::orchestrator::RunError;
    use chrono::Utc;

    fn render(verbosity: Verbosity, outcome: &RunOutcome) -> String {
        let formatter = TextFormatter::with_color(verbosity, false);
        let mut output = Vec::new();
        formatter.format(outcome, &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_text_formatter_new() {
        let formatter = TextFormatter::new(Verbosity::Normal);
        assert_eq!(formatter.verbosity, Verbosity::Normal);
        assert!(formatter.color);
    }

    #[test]
    fn test_state_label() {
        let formatter = TextFormatter::new(Verbosity::Normal);
        assert_eq!(formatter.state_label(AppState::UpToDate), "up to date");
        assert_eq!(
            formatter.state_label(AppState::DownloadCancelled),
            "download cancelled"
        );
    }

    #[test]
    fn test_format_normal() {
        let output = render(Verbosity::Normal, &sample_outcome());

        assert!(output.contains("Updates:"));
        assert!(output.contains("Tor Browser"));
        assert!(output.contains("12.0.6 -> 12.0.7 [downloaded]"));
        assert!(output.contains("org_torproject_torbrowser_12_0_7.apk"));
        assert!(output.contains("Kiwi Browser"));
        assert!(output.contains("connection refused"));
        // Up to date apps only show in verbose mode
        assert!(!output.contains("Iceraven"));
        assert!(output.contains("Summary:"));
        assert!(output.contains("1 update(s) available"));
        assert!(output.contains("1 app(s) failed"));
    }

    #[test]
    fn test_format_quiet() {
        let output = render(Verbosity::Quiet, &sample_outcome());

        assert!(output.contains("1 update(s), 1 downloaded, 1 failed"));
        assert!(!output.contains("Summary:"));
        assert!(!output.contains("Other apps:"));
    }

    #[test]
    fn test_format_verbose() {
        let output = render(Verbosity::Verbose, &sample_outcome());

        assert!(output.contains("Other apps:"));
        assert!(output.contains("(up to date 2.9.1)"));
        assert!(output.contains("(not installed)"));
    }

    #[test]
    fn test_format_up_to_date() {
        let mut outcome = sample_outcome();
        outcome.apps.retain(|app| app.app == App::Iceraven);
        outcome.errors.clear();

        let output = render(Verbosity::Normal, &outcome);
        assert!(output.contains("All apps are up to date."));
        assert!(!output.contains("Updates:"));
    }

    #[test]
    fn test_format_download_failed() {
        let mut outcome = sample_outcome();
        let tor = outcome
            .apps
            .iter_mut()
            .find(|app| app.app == App::TorBrowser)
            .unwrap();
        tor.state = AppState::DownloadFailed;
        tor.artifact = None;
        tor.error = Some("size mismatch: expected 10 bytes, got 7".to_string());

        let output = render(Verbosity::Normal, &outcome);
        assert!(output.contains("12.0.6 -> 12.0.7 [download failed]"));
        assert!(output.contains("size mismatch"));
        assert!(output.contains("2 app(s) failed"));
    }

    #[test]
    fn test_format_metered_note() {
        let mut outcome = sample_outcome();
        outcome.downloads_skipped = Some(DownloadSkip::MeteredNetwork);

        let output = render(Verbosity::Normal, &outcome);
        assert!(output.contains("network is metered"));
    }

    #[test]
    fn test_format_offline() {
        let mut outcome = sample_outcome();
        outcome.status = RunStatus::Offline;
        outcome.apps.clear();
        outcome.started_at = Utc::now();

        let output = render(Verbosity::Normal, &outcome);
        assert_eq!(output, "No internet connection, nothing was checked.\n");
    }

    #[test]
    fn test_format_error_without_app() {
        let mut outcome = sample_outcome();
        outcome.errors.push(RunError {
            app: None,
            message: "permission denied".to_string(),
            key: MessageKey::UnknownBug,
        });

        let output = render(Verbosity::Normal, &outcome);
        assert!(output.contains("Error (unknown bug): permission denied"));
    }
}
