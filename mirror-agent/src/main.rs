//! Mirror Agent - Main entry point
//!
//! One-way folder mirror: keeps REPLICA identical to SOURCE, re-syncing every
//! INTERVAL seconds and logging every change to the console and to LOG.

use anyhow::{Context, Result};
use clap::Parser;
use mirror_agent::daemon::shutdown::ShutdownCoordinator;
use mirror_agent::sync::CompareMode;
use mirror_agent::{utils, Config, Driver, TracingSink};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory to mirror
    source: Option<PathBuf>,

    /// Directory kept identical to SOURCE
    replica: Option<PathBuf>,

    /// Seconds between synchronization cycles
    interval: Option<u64>,

    /// Log destination (".log" is appended to bare names)
    log: Option<String>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Compare file contents when size and timestamp match
    #[arg(long)]
    checksum: bool,

    /// Maximum actions applied concurrently
    #[arg(short, long)]
    workers: Option<usize>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    fn apply_to(&self, config: &mut Config) {
        if let Some(source) = &self.source {
            config.mirror.source = source.clone();
        }
        if let Some(replica) = &self.replica {
            config.mirror.replica = replica.clone();
        }
        if let Some(interval) = self.interval {
            config.mirror.interval_secs = interval;
        }
        if let Some(log) = &self.log {
            config.log.file = Some(log.clone());
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if self.checksum {
            config.compare.mode = CompareMode::Checksum;
        }
        if let Some(workers) = self.workers {
            config.performance.workers = workers;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env()?;
    args.apply_to(&mut config);
    config.validate()?;

    // Initialize logging
    let log_file = config.log.file.as_deref().map(utils::logger::log_file_path);
    utils::logger::init(&config.log.level, log_file.as_deref())?;

    tracing::info!(
        "Starting mirror-agent v{} ({} -> {}, every {}s)",
        env!("CARGO_PKG_VERSION"),
        config.mirror.source.display(),
        config.mirror.replica.display(),
        config.mirror.interval_secs
    );
    if let Some(path) = &log_file {
        tracing::info!("Logging to {}", path.display());
    }

    let sink = Arc::new(TracingSink::new(&config.mirror.source, &config.mirror.replica));
    let shutdown_coordinator = ShutdownCoordinator::new();
    let mut driver = Driver::with_cancel(config.driver_options(), sink, shutdown_coordinator.token());

    if args.once {
        let report = driver.run_cycle().await;
        if let Some(reason) = report.fatal {
            anyhow::bail!("Sync cycle failed: {reason}");
        }
        return Ok(());
    }

    let driver_handle = tokio::spawn(async move {
        driver.run().await;
    });

    // Wait for shutdown signal
    if let Err(e) = shutdown_coordinator.wait_for_signal().await {
        tracing::error!("Failed to listen for shutdown signals: {}", e);
        shutdown_coordinator.trigger();
    }

    // The driver finishes the cycle in flight before stopping
    driver_handle.await.context("Driver task panicked")?;
    tracing::info!("Shutdown complete");

    Ok(())
}
