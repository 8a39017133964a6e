//! apkup - update checker and downloader for Android apps
//!
//! Resolves the latest published version of every installed app, compares
//! it with the installed one and downloads verified artifacts ready for
//! installation.

use anyhow::Context;
use apkup::cli::CliArgs;
use apkup::config::Settings;
use apkup::domain::App;
use apkup::download::{ArtifactCache, Pipeline};
use apkup::fetch::{CachedFetcher, HttpClient};
use apkup::orchestrator::{Orchestrator, RunOutcome};
use apkup::output::{create_formatter, OutputConfig, OutputFormatter};
use apkup::platform::{
    Host, InstalledAppsFile, LogNotifier, ProbeNetworkMonitor, SystemClock,
};
use apkup::scheduler::Scheduler;
use clap::Parser;
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_logging(&args);

    match run(args).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr, `RUST_LOG` wins over the verbosity flags
fn init_logging(args: &CliArgs) {
    let default = if args.verbose {
        "apkup=debug"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Main application logic
async fn run(args: CliArgs) -> anyhow::Result<ExitCode> {
    if args.list_apps {
        list_apps(&mut io::stdout().lock())?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(ref cache_dir) = args.cache_dir {
        settings.cache_dir = Some(cache_dir.clone());
    }
    let cache = ArtifactCache::new(settings.cache_dir());

    if args.purge {
        let mut removed = 0;
        for app in App::all() {
            removed += cache.purge(*app)?;
        }
        if !args.quiet {
            println!("Removed {} file(s) from {}", removed, cache.root().display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    if args.watch && !settings.automatic_check {
        println!("Automatic update checks are disabled in the settings.");
        return Ok(ExitCode::SUCCESS);
    }

    tracing::debug!(cache_dir = %cache.root().display(), "starting apkup v{}", env!("CARGO_PKG_VERSION"));

    let client = HttpClient::new().context("failed to create HTTP client")?;
    let fetcher = Arc::new(CachedFetcher::new(client, settings.cache_ttl));
    let pipeline = Pipeline::new(fetcher.clone(), cache)
        .with_min_free_storage(settings.min_free_storage_bytes());
    let installed = InstalledAppsFile::load(&settings.installed_apps_file())?;
    let host = Host {
        clock: Arc::new(SystemClock),
        network: Arc::new(ProbeNetworkMonitor::new(&settings.network)?),
        installed: Arc::new(installed),
        notifier: Arc::new(LogNotifier),
    };

    let orchestrator = Orchestrator::new(settings, args.run_options(), fetcher, pipeline, host);

    let mut output_config = OutputConfig::from_cli(args.json, args.verbose, args.quiet);
    output_config.color = io::stdout().is_terminal();
    let formatter = create_formatter(output_config);

    if args.watch {
        let runs = Scheduler::new(&orchestrator)
            .run(
                |outcome| {
                    if let Err(e) = print_outcome(formatter.as_ref(), outcome) {
                        tracing::warn!("failed to write output: {}", e);
                    }
                },
                async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::warn!("failed to listen for ctrl-c: {}", e);
                        std::future::pending::<()>().await;
                    }
                },
            )
            .await;
        tracing::info!(runs, "stopped watching");
        return Ok(ExitCode::SUCCESS);
    }

    let outcome = orchestrator.run().await;
    print_outcome(formatter.as_ref(), &outcome)?;

    // Per-app failures are part of the outcome, the run itself succeeded
    Ok(ExitCode::SUCCESS)
}

fn print_outcome(formatter: &dyn OutputFormatter, outcome: &RunOutcome) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    formatter.format(outcome, &mut stdout)?;
    stdout.flush()
}

fn list_apps(writer: &mut dyn Write) -> io::Result<()> {
    for app in App::all() {
        let info = app.info();
        writeln!(
            writer,
            "{:14} {:16} {:32} {}",
            app.id(),
            info.title,
            info.package_name,
            info.download_source
        )?;
    }
    Ok(())
}
