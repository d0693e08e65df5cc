//! Multi-platform fan-out for a single job
//!
//! One pass over a job goes: filter the client's platforms by capability,
//! validate the file against each survivor, write the ledger rows, then
//! authenticate and post concurrently. Every platform call runs under its own
//! timeout and panic guard, so one platform's failure is recorded against
//! that platform and never touches its siblings.

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{PlatformError, PostfanError, Result};
use crate::platforms::{Platform, PlatformRegistry};
use crate::types::{ClientPlatform, Job, PlatformPost, PostReceipt};

pub const DEFAULT_PLATFORM_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Outcome of one platform within a fan-out pass
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PostResult {
    pub platform: String,
    pub success: bool,
    pub external_post_id: Option<String>,
    pub external_url: Option<String>,
    pub posted_at: Option<i64>,
    pub error: Option<String>,
    /// Delivered on an earlier pass; not posted again
    pub already_posted: bool,
}

impl PostResult {
    fn posted(platform: &str, receipt: &PostReceipt) -> Self {
        Self {
            platform: platform.to_string(),
            success: true,
            external_post_id: Some(receipt.external_post_id.clone()),
            external_url: receipt.external_url.clone(),
            posted_at: Some(receipt.timestamp),
            error: None,
            already_posted: false,
        }
    }

    fn earlier(post: &PlatformPost) -> Self {
        Self {
            platform: post.platform.clone(),
            success: true,
            external_post_id: post.external_post_id.clone(),
            external_url: post.external_url.clone(),
            posted_at: post.posted_at,
            error: None,
            already_posted: true,
        }
    }

    fn failed(platform: &str, error: String) -> Self {
        Self {
            platform: platform.to_string(),
            success: false,
            external_post_id: None,
            external_url: None,
            posted_at: None,
            error: Some(error),
            already_posted: false,
        }
    }
}

/// Aggregate of one fan-out pass, keyed by platform name
#[derive(Debug, Clone, Default, Serialize)]
pub struct FanOutReport {
    pub job_id: i64,
    pub successful_platforms: Vec<String>,
    pub failed_platforms: Vec<String>,
    pub already_posted: Vec<String>,
    /// Enabled platforms dropped by capability or extension filtering
    pub skipped_platforms: Vec<String>,
    /// Dry run only: platforms that would have been posted to
    pub planned_platforms: Vec<String>,
    pub dry_run: bool,
    pub results: BTreeMap<String, PostResult>,
}

impl FanOutReport {
    /// At least one platform has the job, now or from an earlier pass
    pub fn is_success(&self) -> bool {
        !self.successful_platforms.is_empty() || !self.already_posted.is_empty()
    }

    fn record(&mut self, result: PostResult) {
        if result.already_posted {
            self.already_posted.push(result.platform.clone());
        } else if result.success {
            self.successful_platforms.push(result.platform.clone());
        } else {
            self.failed_platforms.push(result.platform.clone());
        }
        self.results.insert(result.platform.clone(), result);
    }

    fn finish(mut self) -> Self {
        self.successful_platforms.sort();
        self.failed_platforms.sort();
        self.already_posted.sort();
        self.skipped_platforms.sort();
        self.planned_platforms.sort();
        self
    }
}

/// Authenticated adapters for the duration of one runner tick
///
/// Keyed by (client, platform). A platform is authenticated at most once per
/// session; a failed authentication is remembered too, so later jobs of the
/// same client in the same tick do not retry it.
#[derive(Default)]
pub struct AuthSession {
    entries: HashMap<(String, String), std::result::Result<Arc<dyn Platform>, String>>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key(client: &str, platform: &str) -> (String, String) {
        (client.to_string(), platform.to_string())
    }

    fn contains(&self, client: &str, platform: &str) -> bool {
        self.entries.contains_key(&Self::key(client, platform))
    }

    fn get(&self, client: &str, platform: &str) -> Option<&std::result::Result<Arc<dyn Platform>, String>> {
        self.entries.get(&Self::key(client, platform))
    }
}

/// A platform that survived filtering, with its ledger row
struct Target<'a> {
    config: &'a ClientPlatform,
    row_id: i64,
}

/// Drives one job across its client's platforms
#[derive(Clone)]
pub struct FanOutManager {
    db: Database,
    registry: PlatformRegistry,
    timeout: Duration,
    max_concurrency: usize,
    dry_run: bool,
}

impl FanOutManager {
    pub fn new(db: Database, registry: PlatformRegistry) -> Self {
        Self {
            db,
            registry,
            timeout: DEFAULT_PLATFORM_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            dry_run: false,
        }
    }

    /// Bound on every authenticate and post call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bound on concurrent platform calls within one job
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Stop every pass once the ledger rows exist: no authentication, no posts
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    /// Publish `job` to every eligible platform in `targets`
    ///
    /// Platform failures of any kind end up in the report and the ledger.
    /// Only storage errors are returned as `Err`.
    pub async fn fan_out(
        &self,
        job: &Job,
        targets: &[ClientPlatform],
        session: &mut AuthSession,
    ) -> Result<FanOutReport> {
        let mut report = FanOutReport {
            job_id: job.id,
            dry_run: self.dry_run,
            ..Default::default()
        };

        let eligible = self.filter(job, targets, &mut report);

        let mut pending = Vec::new();
        for config in eligible {
            let entry = self.db.prepare_platform_post(job.id, &config.platform).await?;
            if entry.already_posted {
                debug!(job_id = job.id, platform = %config.platform, "Already posted, skipping");
                report.record(PostResult::earlier(&entry.post));
            } else {
                pending.push(Target {
                    config,
                    row_id: entry.post.id,
                });
            }
        }

        if self.dry_run {
            report.planned_platforms = pending.iter().map(|t| t.config.platform.clone()).collect();
            let report = report.finish();
            info!(job_id = job.id, platforms = ?report.planned_platforms, "Dry run: would post");
            return Ok(report);
        }

        if pending.is_empty() {
            return Ok(report.finish());
        }

        self.authenticate(&job.client, &pending, session).await;

        let mut posting = Vec::new();
        for target in &pending {
            match session.get(&job.client, &target.config.platform) {
                Some(Ok(platform)) => posting.push((target, platform.clone())),
                Some(Err(message)) => {
                    self.db.mark_platform_failed(target.row_id, message).await?;
                    report.record(PostResult::failed(&target.config.platform, message.clone()));
                }
                None => {
                    let message = PlatformError::Authentication("no session".to_string()).to_string();
                    self.db.mark_platform_failed(target.row_id, &message).await?;
                    report.record(PostResult::failed(&target.config.platform, message));
                }
            }
        }

        let kind = job.media_kind();
        let caption = job.caption.as_deref();
        let outcomes: Vec<_> = stream::iter(posting)
            .map(|(target, platform)| async move {
                let result = guarded(self.timeout, platform.publish(kind, &job.path, caption)).await;
                (target, result)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for (target, result) in outcomes {
            let platform = &target.config.platform;
            match result {
                Ok(receipt) => {
                    self.db.mark_platform_posted(target.row_id, &receipt).await?;
                    info!(
                        job_id = job.id,
                        platform = %platform,
                        external_post_id = %receipt.external_post_id,
                        "Posted"
                    );
                    report.record(PostResult::posted(platform, &receipt));
                }
                Err(e) => {
                    let message = error_message(&e);
                    self.db.mark_platform_failed(target.row_id, &message).await?;
                    warn!(job_id = job.id, platform = %platform, error = %message, "Post failed");
                    report.record(PostResult::failed(platform, message));
                }
            }
        }

        Ok(report.finish())
    }

    /// Enabled, registered platforms that support the job's content and file
    ///
    /// Runs before any adapter is constructed, so files are checked against
    /// the registered capabilities. An adapter that overrides
    /// `Platform::validate_file` with stricter rules is not consulted here.
    fn filter<'a>(
        &self,
        job: &Job,
        targets: &'a [ClientPlatform],
        report: &mut FanOutReport,
    ) -> Vec<&'a ClientPlatform> {
        let kind = job.media_kind();
        let mut eligible: BTreeMap<&str, &ClientPlatform> = BTreeMap::new();

        for config in targets.iter().filter(|c| c.enabled) {
            let name = config.platform.as_str();
            let Some(caps) = self.registry.capabilities(name) else {
                warn!(job_id = job.id, platform = name, "Unknown platform, skipping");
                report.skipped_platforms.push(name.to_string());
                continue;
            };
            if !caps.supports(kind) {
                debug!(job_id = job.id, platform = name, %kind, "Content type not supported");
                report.skipped_platforms.push(name.to_string());
                continue;
            }
            if let Err(e) = caps.validate_file(&job.path, job.content_type) {
                debug!(job_id = job.id, platform = name, error = %e, "File rejected");
                report.skipped_platforms.push(name.to_string());
                continue;
            }
            eligible.entry(name).or_insert(config);
        }

        eligible.into_values().collect()
    }

    /// Authenticate every target not yet in the session, concurrently
    async fn authenticate(&self, client: &str, pending: &[Target<'_>], session: &mut AuthSession) {
        let needed: Vec<&ClientPlatform> = pending
            .iter()
            .map(|t| t.config)
            .filter(|c| !session.contains(client, &c.platform))
            .collect();
        if needed.is_empty() {
            return;
        }

        let registry = &self.registry;
        let outcomes: Vec<_> = stream::iter(needed)
            .map(|config| async move {
                let result = guarded(self.timeout, async move {
                    let mut platform = registry.create(config)?;
                    platform.authenticate().await?;
                    Ok::<_, PostfanError>(platform)
                })
                .await;
                (config, result)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for (config, result) in outcomes {
            let entry = match result {
                Ok(platform) => {
                    debug!(client, platform = %config.platform, "Authenticated");
                    Ok(Arc::from(platform))
                }
                Err(e) => {
                    let message = error_message(&e);
                    warn!(client, platform = %config.platform, error = %message, "Authentication failed");
                    Err(message)
                }
            };
            session
                .entries
                .insert(AuthSession::key(client, &config.platform), entry);
        }
    }
}

/// Run one platform call under a timeout, turning a panic into an error
async fn guarded<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, AssertUnwindSafe(call).catch_unwind()).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(PlatformError::Posting(format!("adapter panicked: {}", detail)).into())
        }
        Err(_) => Err(PlatformError::Timeout(limit).into()),
    }
}

/// Ledger text for an error: the platform error itself, without the wrapper
fn error_message(error: &PostfanError) -> String {
    match error {
        PostfanError::Platform(e) => e.to_string(),
        other => other.to_string(),
    }
}
