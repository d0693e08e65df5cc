//! fan-send - Runner daemon for scheduled publishing
//!
//! Polls the job queue and fans every due job out to the platforms its
//! client has enabled.

use clap::Parser;
use libpostfan::logging::{config_from_env, LogFormat};
use libpostfan::{Config, Database, FanOutManager, PlatformRegistry, PostfanError, Runner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "fan-send")]
#[command(version)]
#[command(about = "Runner daemon for scheduled publishing")]
#[command(long_about = "\
fan-send - Runner daemon for scheduled publishing

DESCRIPTION:
    fan-send is a long-running daemon that watches the Postfan job queue
    and publishes each job once its eta has passed.

    Every tick it requeues stale claims, claims the due jobs one at a time
    and posts each to every enabled platform of the job's client. A job is
    done as soon as one platform accepts it; when none does, it is put back
    in the queue for a later attempt.

USAGE:
    # Run in foreground (logs to stderr)
    fan-send

    # Run with custom poll interval
    fan-send --poll-interval 30

    # Only serve one client
    fan-send --client acme

    # Process due jobs once and exit
    fan-send --once

    # Show which platforms each due job would go to, without posting
    fan-send --once --dry-run

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current tick)

CONFIGURATION:
    Configuration file: ~/.config/postfan/config.toml
    Database location: ~/.local/share/postfan/queue.db

    [scheduler]
    poll_interval = 60      # seconds between ticks
    batch_limit = 10        # due jobs per tick
    retry_delay = 3600      # seconds before a failed job is retried
    platform_timeout = 30   # seconds per authenticate/post call
    max_concurrency = 8     # concurrent platform calls per job
    stale_after = 1800      # requeue in_progress jobs older than this (0 = off)

    Override with environment variables:
        POSTFAN_CONFIG    - Path to config file
        POSTFAN_DB_PATH   - Path to database file

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for due jobs (default: 60)")]
    poll_interval: Option<u64>,

    /// Only process jobs of this client (overrides config)
    #[arg(long, value_name = "CLIENT")]
    client: Option<String>,

    /// Maximum jobs per tick (overrides config)
    #[arg(long, value_name = "N")]
    batch_limit: Option<u32>,

    /// Process due jobs once and exit
    #[arg(long)]
    once: bool,

    /// Write pending ledger rows and report target platforms without posting
    #[arg(long)]
    #[arg(help = "Plan due jobs without authenticating, posting or changing job state")]
    dry_run: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Log format: text, json or pretty
    #[arg(long, env = "POSTFAN_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut logging = config_from_env();
    logging.format = cli.log_format;
    logging.verbose = cli.verbose;
    logging.init();

    if let Err(e) = run(cli).await {
        error!(error = %format!("{:#}", e), "fan-send failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(interval) = cli.poll_interval {
        config.scheduler.poll_interval = interval;
    }
    if let Some(limit) = cli.batch_limit {
        config.scheduler.batch_limit = limit;
    }
    if cli.client.is_some() {
        config.scheduler.client = cli.client.clone();
    }
    let settings = config.scheduler.clone();

    let db = Database::new(&config.database.path).await?;

    info!("fan-send daemon starting");
    info!("Poll interval: {}s", settings.poll_interval().as_secs());
    if let Some(client) = &settings.client {
        info!(client = %client, "Serving a single client");
    }

    let fanout = FanOutManager::new(db.clone(), PlatformRegistry::with_defaults())
        .with_timeout(settings.platform_timeout())
        .with_max_concurrency(settings.max_concurrency)
        .with_dry_run(cli.dry_run);
    if cli.dry_run {
        info!("Dry run: nothing will be posted");
    }
    let runner = Runner::new(db.clone(), fanout, Arc::new(db.clone()), settings);

    if cli.once {
        let summary = runner.tick().await?;
        info!(
            due = summary.due,
            done = summary.done,
            rescheduled = summary.rescheduled,
            planned = summary.planned,
            "fan-send: processed due jobs once, exiting"
        );
    } else {
        let shutdown = Arc::new(AtomicBool::new(false));
        setup_signal_handlers(shutdown.clone())?;
        runner.run(shutdown).await;
    }

    db.close().await;
    info!("fan-send daemon stopped");
    Ok(())
}

/// Configuration problems exit with 2, everything else with 1
fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<PostfanError>() {
        Some(PostfanError::Config(_)) => 2,
        _ => 1,
    }
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    use anyhow::Context;
    use futures::stream::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Signal setup failed")?;

    tokio::spawn(async move {
        while let Some(signal) = signals.next().await {
            if matches!(signal, SIGTERM | SIGINT) {
                info!("Received shutdown signal, stopping gracefully...");
                shutdown.store(true, Ordering::Relaxed);
                break;
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, stopping gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });
    Ok(())
}
