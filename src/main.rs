//! Revision cleaner command line.
//!
//! Loads a repository snapshot into the in-memory collaborators, runs one
//! cleanup pass over it and optionally writes the cleaned snapshot back.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cleaner::{
    CleanupConfig, CleanupJob, Collaborators, InMemoryRepository, JobOutcome, RepositorySnapshot,
};
use common::cli::{CommonArgs, CommonCommands, utils};
use common::config::Configuration;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "revclean")]
#[command(about = "Removes historical revisions according to count and age retention rules")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one cleanup pass over a repository snapshot
    Run(RunArgs),
    #[command(flatten)]
    Common(CommonCommands),
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long, help = "Repository snapshot (JSON) to clean")]
    snapshot: PathBuf,

    #[arg(long, help = "Write the cleaned snapshot to this file")]
    output: Option<PathBuf>,

    #[arg(long, help = "Log the revisions that would be deleted without deleting them")]
    dry_run: bool,
}

/// Waits for a shutdown signal (SIGINT or SIGTERM)
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => log::info!("Received SIGINT"),
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        log::info!("Received Ctrl+C");
    }

    Ok(())
}

fn read_snapshot(path: &Path) -> Result<RepositorySnapshot> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open snapshot {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))
}

fn write_snapshot(path: &Path, snapshot: &RepositorySnapshot) -> Result<()> {
    let json =
        serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot to JSON")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write snapshot {}", path.display()))
}

/// Validate the configuration, including the retention bounds
fn validate(config: &Configuration) -> Result<()> {
    utils::validate_config(config)?;

    let cleanup_config = CleanupConfig::from(&config.cleaner);
    let warnings = cleanup_config
        .validate()
        .context("Invalid retention configuration")?;
    for warning in warnings {
        log::warn!("{warning}");
    }

    log::info!("✅ Retention configuration validation passed");
    Ok(())
}

async fn run(args: &RunArgs, config: &Configuration) -> Result<Option<JobOutcome>> {
    if !config.cleaner.enabled {
        log::info!("Revision cleaner is disabled in configuration (cleaner.enabled = false)");
        log::info!("Set REVCLEAN__CLEANER__ENABLED=true or enable it in the config file");
        return Ok(None);
    }

    let mut cleanup_config = CleanupConfig::from(&config.cleaner);
    if args.dry_run {
        cleanup_config = cleanup_config.with_dry_run(true);
    }

    let snapshot = read_snapshot(&args.snapshot)?;
    log::info!(
        "Loaded {} entities with {} revisions from {}",
        snapshot.entities.len(),
        snapshot.revision_count(),
        args.snapshot.display()
    );

    let repository = Arc::new(InMemoryRepository::from_snapshot(snapshot));
    let cancellation = CancellationToken::new();
    let job = CleanupJob::new(Collaborators::from_backend(repository.clone()), cleanup_config)
        .with_cancellation(cancellation.clone());

    let shutdown_task = {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            match wait_for_shutdown_signal().await {
                Ok(()) => {
                    log::info!("Shutdown requested, stopping after the current page");
                    cancellation.cancel();
                }
                Err(e) => log::error!("Shutdown signal handler failed: {e:?}"),
            }
        })
    };

    let outcome = job.execute().await.context("Revision cleanup failed");
    shutdown_task.abort();
    let outcome = outcome?;

    job.metrics().summary().log();
    match &outcome {
        JobOutcome::Bypassed => log::info!("Repository is read-only, nothing was cleaned"),
        JobOutcome::LockUnavailable => log::info!("Another cleanup run holds the lock"),
        JobOutcome::AlreadyRunning => log::info!("This cleanup job is already running"),
        JobOutcome::Completed(summary) if summary.is_partial() => log::warn!(
            "Run {} ended early, repository only partially cleaned",
            summary.run_id
        ),
        JobOutcome::Completed(summary) => log::info!(
            "Run {} completed: {} revisions deleted",
            summary.run_id,
            summary.revisions_deleted
        ),
        JobOutcome::Aborted(summary) => log::info!(
            "Run {} aborted: {} revisions deleted before shutdown",
            summary.run_id,
            summary.revisions_deleted
        ),
    }

    if let Some(output) = &args.output {
        write_snapshot(output, &repository.snapshot())?;
        log::info!("Wrote cleaned snapshot to {}", output.display());
    }

    Ok(Some(outcome))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on CLI arguments
    utils::init_logging(&cli.common);

    // Load application configuration
    let config = utils::load_config(cli.common.config.as_ref())?;

    match &cli.command {
        Commands::Run(args) => {
            if let Some(outcome) = run(args, &config).await? {
                let json = serde_json::to_string_pretty(&outcome)
                    .context("Failed to serialize run outcome to JSON")?;
                println!("{json}");
            }
            Ok(())
        }
        Commands::Common(CommonCommands::Config { json }) => utils::display_config(&config, *json),
        Commands::Common(CommonCommands::Validate) => validate(&config),
        Commands::Common(CommonCommands::Version) => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}
