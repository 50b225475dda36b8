use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared across all binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Subcommands that only inspect the configuration
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CommonCommands {
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Log level implied by the CLI flags
    pub fn log_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments. `RUST_LOG` takes precedence.
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(args)));

        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            let cleaner = &config.cleaner;
            println!("Revision Cleaner Configuration:");
            println!("===============================");
            println!("Enabled: {}", cleaner.enabled);
            println!("Max versions to keep: {}", cleaner.max_versions_to_keep);
            println!("Min versions to keep: {}", cleaner.min_versions_to_keep);
            println!("Max days to keep: {}", cleaner.max_days_to_keep);
            println!("Page size: {}", cleaner.page_size);
            println!("Worker count: {}", cleaner.worker_count);
            match &cleaner.search_limiter {
                Some(limiter) => println!("Search limiter: {limiter}"),
                None => println!("Search limiter: none"),
            }
            println!("Store: {}", cleaner.store_scope());
            println!(
                "Lock: {} (ttl {})",
                cleaner.lock_name,
                humantime_serde::re::humantime::format_duration(cleaner.lock_ttl)
            );
            println!("Dry run: {}", cleaner.dry_run);
        }
        Ok(())
    }

    /// Validate the parts of the configuration that do not depend on the
    /// cleaner's retention rules
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");

        let cleaner = &config.cleaner;
        if cleaner.store_protocol.is_empty() || cleaner.store_identifier.is_empty() {
            anyhow::bail!("Store protocol and identifier cannot be empty");
        }

        if cleaner.lock_name.trim().is_empty() {
            anyhow::bail!("Lock name cannot be empty");
        }

        if cleaner.page_size == 0 {
            anyhow::bail!("Page size must be positive");
        }

        if cleaner.worker_count == 0 {
            anyhow::bail!("Worker count must be positive");
        }

        log::info!("✅ Configuration validation passed");
        Ok(())
    }
}
