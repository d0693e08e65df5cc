//! fan-queue - Manage the publishing queue
//!
//! Unix-style intake and administration tool: enqueue jobs, inspect and
//! steer them, review the per-platform ledger and configure which platforms
//! each client publishes to.

use clap::{Parser, Subcommand, ValueEnum};
use libpostfan::db::LedgerStats;
use libpostfan::logging::config_from_env;
use libpostfan::platforms::PlatformRegistry;
use libpostfan::scheduling::{format_timestamp, parse_eta};
use libpostfan::{
    ClientPlatform, Config, Database, Job, JobStatus, NewJob, PlatformPost, PlatformPostStatus,
    PostfanError, Result,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

#[derive(Parser, Debug)]
#[command(name = "fan-queue")]
#[command(version)]
#[command(about = "Manage the Postfan publishing queue")]
#[command(long_about = "\
fan-queue - Manage the Postfan publishing queue

DESCRIPTION:
    fan-queue is a Unix-style tool for feeding and administering the queue
    that fan-send works through. Use it to enqueue jobs, list, cancel or
    reschedule them, inspect per-platform outcomes, retry failed platform
    posts and configure the platforms of each client.

COMMANDS:
    enqueue       Add a job to the queue
    list          List jobs
    show          Show one job and its per-platform outcomes
    cancel        Cancel a queued or in-progress job
    reschedule    Move a job to a different time
    fail          Mark a job as terminally failed
    stats         Show job and ledger counts
    failed        List failed platform posts
    retry         Reset a failed platform post to pending
    sweep         Requeue stale in-progress jobs
    platforms     Configure client platforms
    capabilities  Show what each platform accepts

USAGE EXAMPLES:
    # Publish a reel for a client tomorrow afternoon
    fan-queue enqueue --client acme --path media/clip.mp4 --type reel --at \"tomorrow 3pm\"

    # List queued jobs as JSON
    fan-queue list --status queued --format json

    # Configure and enable Facebook for a client
    fan-queue platforms set acme facebook \\
        --credential FACEBOOK_ACCESS_TOKEN=EAAB... --credential FACEBOOK_PAGE_ID=1234

    # Retry a failed platform post
    fan-queue retry 42

CONFIGURATION:
    Configuration file: ~/.config/postfan/config.toml
    Database location: ~/.local/share/postfan/queue.db

    Override with environment variables:
        POSTFAN_CONFIG    - Path to config file
        POSTFAN_DB_PATH   - Path to database file

EXIT CODES:
    0 - Success
    1 - Operation failed (invalid transition, database or configuration error)
    3 - Invalid input (bad job ID, time format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a job to the queue
    Enqueue {
        /// Client the job belongs to
        #[arg(long)]
        client: String,

        /// Local media file to publish
        #[arg(long)]
        path: String,

        /// Content type: feed, reel, story or weekly
        #[arg(long = "type", value_name = "TYPE")]
        content_type: String,

        /// Caption text
        #[arg(long)]
        caption: Option<String>,

        /// When to publish (e.g., "now", "2h", "2025-06-01 09:00", "tomorrow 3pm")
        #[arg(long, default_value = "now")]
        at: String,

        /// Extra metadata as KEY=VALUE (VALUE may be JSON)
        #[arg(long = "extra", value_name = "KEY=VALUE")]
        extras: Vec<String>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// List jobs
    List {
        /// Only jobs with this status
        #[arg(short, long)]
        status: Option<String>,

        /// Only jobs of this client
        #[arg(short, long)]
        client: Option<String>,

        /// Maximum number of jobs
        #[arg(short, long, default_value = "50")]
        limit: u32,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Show one job and its per-platform outcomes
    Show {
        job_id: i64,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Cancel a queued or in-progress job
    Cancel {
        job_id: i64,

        /// Reason recorded in the job's error log
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Move a job to a different time
    Reschedule {
        job_id: i64,

        /// New time (e.g., "tomorrow 3pm", "2h", "now")
        time: String,

        /// Reason recorded in the job's error log
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Mark a job as terminally failed
    Fail {
        job_id: i64,

        /// Reason recorded in the job's error log
        #[arg(short, long)]
        reason: String,
    },

    /// Show job and ledger counts
    Stats {
        /// Narrow ledger counts to one platform
        #[arg(short, long)]
        platform: Option<String>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// List failed platform posts
    Failed {
        #[arg(short, long, default_value = "20")]
        limit: u32,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Reset a failed platform post to pending
    Retry {
        /// Ledger row id (see `fan-queue failed`)
        post_id: i64,
    },

    /// Requeue in-progress jobs whose claim is older than a threshold
    Sweep {
        /// Threshold in seconds (default: scheduler.stale_after)
        #[arg(long, value_name = "SECONDS")]
        older_than: Option<i64>,
    },

    /// Configure client platforms
    #[command(subcommand)]
    Platforms(PlatformCommands),

    /// Show what each platform accepts
    Capabilities {
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },
}

#[derive(Subcommand, Debug)]
enum PlatformCommands {
    /// List client platform configurations (credential values are never shown)
    List {
        /// Only this client
        #[arg(short, long)]
        client: Option<String>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Create or replace a client's platform configuration
    Set {
        client: String,
        platform: String,

        /// Credential as KEY=VALUE
        #[arg(long = "credential", value_name = "KEY=VALUE")]
        credentials: Vec<String>,

        /// Setting as KEY=VALUE (VALUE may be JSON)
        #[arg(long = "setting", value_name = "KEY=VALUE")]
        settings: Vec<String>,

        /// Store the configuration disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Enable a configured platform
    Enable { client: String, platform: String },

    /// Disable a configured platform
    Disable { client: String, platform: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // quiet unless asked: stdout carries command output
    let mut logging = config_from_env();
    if std::env::var("POSTFAN_LOG_LEVEL").is_err() {
        logging.level = "error".to_string();
    }
    logging.verbose = cli.verbose;
    logging.init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    // Capability listing needs no storage
    if let Commands::Capabilities { format } = cli.command {
        cmd_capabilities(format);
        return Ok(());
    }

    let db = Database::new(&config.database.path).await?;

    let result = match cli.command {
        Commands::Enqueue {
            client,
            path,
            content_type,
            caption,
            at,
            extras,
            format,
        } => {
            let mut new_job = NewJob::new(client, path, content_type).eta(parse_eta(&at)?);
            if let Some(caption) = caption {
                new_job = new_job.caption(caption);
            }
            for (key, value) in parse_pairs(&extras)? {
                new_job = new_job.extra(key, value);
            }
            cmd_enqueue(&db, new_job, format).await
        }
        Commands::List {
            status,
            client,
            limit,
            format,
        } => {
            let status = status.map(|s| s.parse::<JobStatus>()).transpose()?;
            cmd_list(&db, status, client.as_deref(), limit, format).await
        }
        Commands::Show { job_id, format } => cmd_show(&db, job_id, format).await,
        Commands::Cancel { job_id, reason } => {
            let job = db.cancel(job_id, reason.as_deref()).await?;
            println!("Cancelled job {}", job.id);
            Ok(())
        }
        Commands::Reschedule {
            job_id,
            time,
            reason,
        } => {
            let eta = parse_eta(&time)?;
            let job = db.reschedule(job_id, eta, reason.as_deref()).await?;
            println!("Rescheduled job {} to {}", job.id, format_timestamp(job.eta));
            Ok(())
        }
        Commands::Fail { job_id, reason } => {
            let job = db.mark_failed(job_id, &reason).await?;
            println!("Marked job {} as failed", job.id);
            Ok(())
        }
        Commands::Stats { platform, format } => cmd_stats(&db, platform.as_deref(), format).await,
        Commands::Failed { limit, format } => cmd_failed(&db, limit, format).await,
        Commands::Retry { post_id } => cmd_retry(&db, post_id).await,
        Commands::Sweep { older_than } => {
            let threshold = older_than.unwrap_or(config.scheduler.stale_after);
            if threshold <= 0 {
                return Err(PostfanError::InvalidInput(
                    "sweep threshold must be positive".to_string(),
                ));
            }
            let requeued = db
                .requeue_stale(threshold, chrono::Utc::now().timestamp())
                .await?;
            println!("Requeued {} job(s)", requeued.len());
            Ok(())
        }
        Commands::Platforms(command) => cmd_platforms(&db, command).await,
        Commands::Capabilities { .. } => Ok(()),
    };

    db.close().await;
    result
}

/// Add a job to the queue
async fn cmd_enqueue(db: &Database, new_job: NewJob, format: Format) -> Result<()> {
    let id = db.enqueue(new_job).await?;
    match format {
        Format::Json => {
            let job = db.get_job(id).await?.ok_or(PostfanError::JobNotFound(id))?;
            print_json(&job)?;
        }
        Format::Text => println!("{}", id),
    }
    Ok(())
}

/// List jobs
async fn cmd_list(
    db: &Database,
    status: Option<JobStatus>,
    client: Option<&str>,
    limit: u32,
    format: Format,
) -> Result<()> {
    let jobs = db.list_jobs(status, client, limit).await?;

    match format {
        Format::Json => print_json(&jobs)?,
        Format::Text => output_list_text(&jobs),
    }
    Ok(())
}

/// Output jobs as human-readable text
fn output_list_text(jobs: &[Job]) {
    let now = chrono::Utc::now().timestamp();

    for job in jobs {
        let when = if job.status == JobStatus::Queued {
            format_time_until(now, job.eta)
        } else {
            format_timestamp(job.eta)
        };
        println!(
            "{} | {} | {} | {} | {} | {}",
            job.id,
            job.status,
            job.client,
            job.content_type,
            truncate_content(&job.path, 50),
            when
        );
    }
}

/// Show a job and its ledger rows
async fn cmd_show(db: &Database, job_id: i64, format: Format) -> Result<()> {
    let job = db
        .get_job(job_id)
        .await?
        .ok_or(PostfanError::JobNotFound(job_id))?;
    let posts = db.get_platform_posts(job_id).await?;

    match format {
        Format::Json => print_json(&json!({ "job": job, "platform_posts": posts }))?,
        Format::Text => output_job_text(&job, &posts),
    }
    Ok(())
}

fn output_job_text(job: &Job, posts: &[PlatformPost]) {
    println!("Job:          {}", job.id);
    println!("Client:       {}", job.client);
    println!("Status:       {}", job.status);
    println!("Content type: {}", job.content_type);
    println!("Path:         {}", job.path);
    if let Some(caption) = &job.caption {
        println!("Caption:      {}", truncate_content(caption, 60));
    }
    println!("ETA:          {}", format_timestamp(job.eta));
    println!("Attempts:     {}", job.attempts);
    if let Some(runner) = &job.claimed_by {
        println!("Claimed by:   {}", runner);
    }
    if let Some(done_at) = job.done_at {
        println!("Done at:      {}", format_timestamp(done_at));
    }
    if let Some(error) = &job.error {
        println!("Log:");
        for line in error.lines() {
            println!("  {}", line);
        }
    }

    if !posts.is_empty() {
        println!("Platforms:");
        for post in posts {
            let detail = match post.status {
                PlatformPostStatus::Posted => post
                    .external_url
                    .clone()
                    .or_else(|| post.external_post_id.clone())
                    .unwrap_or_default(),
                PlatformPostStatus::Failed => post.error.clone().unwrap_or_default(),
                PlatformPostStatus::Pending => String::new(),
            };
            println!("  [{}] {} {} {}", post.id, post.platform, post.status, detail);
        }
    }
}

/// Show job and ledger statistics
async fn cmd_stats(db: &Database, platform: Option<&str>, format: Format) -> Result<()> {
    let jobs = db.job_counts().await?;
    let ledger = db.platform_post_stats(platform, None).await?;

    match format {
        Format::Json => print_json(&json!({ "jobs": jobs, "platform_posts": ledger }))?,
        Format::Text => output_stats_text(&jobs, &ledger),
    }
    Ok(())
}

fn output_stats_text(jobs: &BTreeMap<String, i64>, ledger: &LedgerStats) {
    let total: i64 = jobs.values().sum();
    println!("Jobs: {}", total);
    for status in JobStatus::ALL {
        println!("  {}: {}", status, jobs.get(status.as_str()).copied().unwrap_or(0));
    }

    println!("Platform posts: {}", ledger.total);
    for (status, count) in &ledger.by_status {
        println!("  {}: {}", status, count);
    }
    if !ledger.by_platform.is_empty() {
        println!("By platform:");
        for (platform, count) in &ledger.by_platform {
            println!("  {}: {}", platform, count);
        }
    }
}

/// List failed ledger rows
async fn cmd_failed(db: &Database, limit: u32, format: Format) -> Result<()> {
    let failed = db.failed_platform_posts(limit).await?;

    match format {
        Format::Json => print_json(&failed)?,
        Format::Text => {
            for row in &failed {
                println!(
                    "{} | job {} | {} | {} | {}",
                    row.post.id,
                    row.post.job_id,
                    row.client,
                    row.post.platform,
                    row.post.error.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

/// Reset a failed ledger row
async fn cmd_retry(db: &Database, post_id: i64) -> Result<()> {
    if db.retry_platform_post(post_id).await? {
        println!("Platform post {} reset to pending", post_id);
        Ok(())
    } else {
        Err(PostfanError::InvalidInput(format!(
            "platform post {} is not failed",
            post_id
        )))
    }
}

async fn cmd_platforms(db: &Database, command: PlatformCommands) -> Result<()> {
    match command {
        PlatformCommands::List { client, format } => {
            let configs = db.list_client_platforms(client.as_deref()).await?;
            match format {
                Format::Json => {
                    let redacted: Vec<Value> = configs.iter().map(redacted_json).collect();
                    print_json(&redacted)?;
                }
                Format::Text => {
                    for config in &configs {
                        let keys: Vec<&str> =
                            config.credentials.keys().map(String::as_str).collect();
                        println!(
                            "{} | {} | {} | credentials: {}",
                            config.client,
                            config.platform,
                            if config.enabled { "enabled" } else { "disabled" },
                            if keys.is_empty() { "-".to_string() } else { keys.join(", ") }
                        );
                    }
                }
            }
            Ok(())
        }
        PlatformCommands::Set {
            client,
            platform,
            credentials,
            settings,
            disabled,
        } => {
            let registry = PlatformRegistry::with_defaults();
            let platform = platform.to_lowercase();
            if !registry.contains(&platform) {
                return Err(PostfanError::InvalidInput(format!(
                    "unknown platform '{}' (known: {})",
                    platform,
                    registry.names().join(", ")
                )));
            }

            let mut config = ClientPlatform::new(client, platform);
            config.enabled = !disabled;
            for (key, value) in split_pairs(&credentials)? {
                config = config.with_credential(key, value);
            }
            for (key, value) in parse_pairs(&settings)? {
                config = config.with_setting(&key, value);
            }
            db.upsert_client_platform(&config).await?;
            println!(
                "Saved {} for {} ({})",
                config.platform,
                config.client,
                if config.enabled { "enabled" } else { "disabled" }
            );
            Ok(())
        }
        PlatformCommands::Enable { client, platform } => {
            set_enabled(db, &client, &platform, true).await
        }
        PlatformCommands::Disable { client, platform } => {
            set_enabled(db, &client, &platform, false).await
        }
    }
}

async fn set_enabled(db: &Database, client: &str, platform: &str, enabled: bool) -> Result<()> {
    if !db.set_client_platform_enabled(client, platform, enabled).await? {
        return Err(PostfanError::InvalidInput(format!(
            "{} has no {} configuration",
            client, platform
        )));
    }
    println!(
        "{} {} for {}",
        if enabled { "Enabled" } else { "Disabled" },
        platform.to_lowercase(),
        client
    );
    Ok(())
}

fn redacted_json(config: &ClientPlatform) -> Value {
    let keys: Vec<&String> = config.credentials.keys().collect();
    json!({
        "client": config.client,
        "platform": config.platform,
        "enabled": config.enabled,
        "credential_keys": keys,
        "settings": config.settings,
    })
}

/// Show the capability table
fn cmd_capabilities(format: Format) {
    let registry = PlatformRegistry::with_defaults();

    match format {
        Format::Json => {
            let table: Map<String, Value> = registry
                .names()
                .into_iter()
                .filter_map(|name| {
                    registry
                        .capabilities(name)
                        .map(|caps| (name.to_string(), json!(caps)))
                })
                .collect();
            println!("{}", Value::Object(table));
        }
        Format::Text => {
            for name in registry.names() {
                if let Some(caps) = registry.capabilities(name) {
                    let list = |supported: bool, exts: &[&str]| {
                        if supported {
                            exts.join(" ")
                        } else {
                            "-".to_string()
                        }
                    };
                    println!(
                        "{:<10} photo: {:<24} video: {:<18} story: {}",
                        name,
                        list(caps.supports_photo, caps.photo_extensions),
                        list(caps.supports_video, caps.video_extensions),
                        list(caps.supports_story, caps.story_extensions)
                    );
                }
            }
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| PostfanError::InvalidInput(format!("cannot serialize output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

/// Split KEY=VALUE arguments
fn split_pairs(pairs: &[String]) -> Result<Vec<(&str, &str)>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
            _ => Err(PostfanError::InvalidInput(format!(
                "expected KEY=VALUE, got '{}'",
                pair
            ))),
        })
        .collect()
}

/// KEY=VALUE arguments whose value is JSON when it parses, a string otherwise
fn parse_pairs(pairs: &[String]) -> Result<Vec<(String, Value)>> {
    Ok(split_pairs(pairs)?
        .into_iter()
        .map(|(key, raw)| {
            let value =
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            (key.to_string(), value)
        })
        .collect())
}

/// Truncate content to max length with ellipsis
fn truncate_content(content: &str, max_len: usize) -> String {
    if content.chars().count() <= max_len {
        content.to_string()
    } else {
        let cut: String = content.chars().take(max_len).collect();
        format!("{}...", cut)
    }
}

/// Format time until the eta in human-readable form
fn format_time_until(now: i64, eta: i64) -> String {
    let diff = eta - now;

    if diff < 0 {
        return "due".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}
