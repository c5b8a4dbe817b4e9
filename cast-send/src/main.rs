//! cast-send - Background daemon for scheduled posting
//!
//! Watches the scheduled post queue and publishes each post once it falls
//! due. Several instances may share one database; a post is claimed before
//! it is published so only one of them sends it.

use chrono::Utc;
use clap::Parser;
use libcrosscast::service::CrosscastService;
use libcrosscast::{logging, Config, CrosscastError};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cast-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled posting")]
#[command(long_about = "\
cast-send - Background daemon for scheduled posting

DESCRIPTION:
    cast-send is a long-running daemon that watches the Crosscast queue
    and publishes scheduled posts once they are due.

    Each tick it releases claims left behind by crashed instances, claims
    the posts that are due, publishes them to their networks and records
    the outcome. A post succeeds when at least one network accepted it.

USAGE:
    # Run in foreground (logs to stderr)
    cast-send

    # Run with custom poll interval
    cast-send --poll-interval 30

    # Enable verbose logging
    cast-send --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current tick)

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml
    Database location: ~/.local/share/crosscast/crosscast.db

    [scheduler]
    interval_secs = 60        # seconds between ticks
    batch_size = 10           # due posts handled per tick
    claim_timeout_secs = 900  # claims older than this are released

    Environment variables:
        CROSSCAST_CONFIG      - Path to config file
        CROSSCAST_LOG_FORMAT  - text, json or pretty
        CROSSCAST_LOG_LEVEL   - Log level when --verbose is not given

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration or database error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for scheduled posts (default: scheduler.interval_secs)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run once and exit (for testing)
    #[arg(long, hide = true)]
    #[arg(help = "Process due posts once and exit (for testing)")]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init_for_cli(cli.verbose, "info");

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<CrosscastError>()
            .map(CrosscastError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    let poll_interval = cli.poll_interval.unwrap_or(config.scheduler.interval_secs);
    let service = CrosscastService::from_config(config).await?;

    info!("cast-send daemon starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(Arc::clone(&shutdown))?;

    info!("Poll interval: {}s", poll_interval);

    let scheduler = service.scheduler();
    if cli.once {
        let now = Utc::now().timestamp();
        let summary = scheduler.tick(now).await?;
        scheduler.housekeeping(now).await?;
        info!(
            due = summary.due,
            published = summary.published,
            failed = summary.failed,
            "processed scheduled posts once, exiting"
        );
    } else {
        scheduler
            .run(Duration::from_secs(poll_interval.max(1)), shutdown)
            .await;
    }

    info!("cast-send daemon stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    use anyhow::Context;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::sync::atomic::Ordering;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!(signal = sig, "Received shutdown signal, stopping gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    tracing::warn!("Signal handling is not available on this platform; stop with Ctrl+C");
    Ok(())
}
