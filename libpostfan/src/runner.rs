//! Polling runner: claims due jobs and fans each one out
//!
//! A tick sweeps stale claims, selects due jobs in (eta, id) order and
//! processes them one at a time. Platform failures never fail a tick; only
//! storage errors do.
//!
//! In dry-run mode a tick neither sweeps nor claims. It plans each due job
//! (filtering and pending ledger rows) and leaves the job queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::db::{ClientConfigProvider, Database};
use crate::error::{PostfanError, Result};
use crate::fanout::{AuthSession, FanOutManager};
use crate::types::Job;

/// Reason logged on a job when no platform accepted it
pub const ALL_PLATFORMS_FAILED: &str = "All platforms failed";

/// Counts for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TickSummary {
    pub due: usize,
    pub claimed: usize,
    pub done: usize,
    pub rescheduled: usize,
    /// Due jobs claimed elsewhere first, or moved by someone else while
    /// this runner was processing them
    pub skipped: usize,
    /// Stale in-progress jobs put back in the queue
    pub requeued: usize,
    /// Dry run: due jobs planned without posting
    pub planned: usize,
}

/// How a claimed job left the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    Rescheduled,
    /// Cancelled, rescheduled or requeued by someone else mid-processing
    Moved,
}

pub struct Runner {
    db: Database,
    fanout: FanOutManager,
    provider: Arc<dyn ClientConfigProvider>,
    settings: SchedulerConfig,
    runner_id: String,
}

impl Runner {
    pub fn new(
        db: Database,
        fanout: FanOutManager,
        provider: Arc<dyn ClientConfigProvider>,
        settings: SchedulerConfig,
    ) -> Self {
        Self {
            db,
            fanout,
            provider,
            settings,
            runner_id: format!("runner-{}", uuid::Uuid::new_v4()),
        }
    }

    /// Recorded as `claimed_by` on every job this runner claims
    pub fn runner_id(&self) -> &str {
        &self.runner_id
    }

    pub fn settings(&self) -> &SchedulerConfig {
        &self.settings
    }

    /// Process every job due now
    pub async fn tick(&self) -> Result<TickSummary> {
        if self.fanout.is_dry_run() {
            return self.plan_tick().await;
        }

        let mut summary = TickSummary::default();
        let now = chrono::Utc::now().timestamp();

        if self.settings.stale_after > 0 {
            summary.requeued = self.db.requeue_stale(self.settings.stale_after, now).await?.len();
        }

        let due = self
            .db
            .get_due(self.settings.batch_limit, self.settings.client.as_deref())
            .await?;
        summary.due = due.len();
        if due.is_empty() {
            debug!("No due jobs");
            return Ok(summary);
        }

        let mut session = AuthSession::new();
        for job in due {
            let job = match self.db.claim_job(job.id, Some(&self.runner_id)).await {
                Ok(job) => job,
                Err(PostfanError::InvalidTransition { .. }) | Err(PostfanError::JobNotFound(_)) => {
                    debug!(job_id = job.id, "Job claimed elsewhere, skipping");
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            summary.claimed += 1;

            match self.process_job(&job, &mut session).await? {
                Outcome::Done => summary.done += 1,
                Outcome::Rescheduled => summary.rescheduled += 1,
                Outcome::Moved => summary.skipped += 1,
            }
        }

        info!(
            due = summary.due,
            done = summary.done,
            rescheduled = summary.rescheduled,
            skipped = summary.skipped,
            requeued = summary.requeued,
            "Tick complete"
        );
        Ok(summary)
    }

    /// Dry-run tick: plan every due job, change no job state
    async fn plan_tick(&self) -> Result<TickSummary> {
        let mut summary = TickSummary::default();
        let due = self
            .db
            .get_due(self.settings.batch_limit, self.settings.client.as_deref())
            .await?;
        summary.due = due.len();

        let mut session = AuthSession::new();
        for job in due {
            match self.fan_out(&job, &mut session).await {
                Ok(report) => {
                    info!(
                        job_id = job.id,
                        client = %job.client,
                        planned = ?report.planned_platforms,
                        already_posted = ?report.already_posted,
                        skipped = ?report.skipped_platforms,
                        "Dry run: job planned"
                    );
                    summary.planned += 1;
                }
                Err(e) if e.is_storage() => return Err(e),
                Err(e) => {
                    warn!(job_id = job.id, error = %e, "Dry run: job cannot be planned");
                    summary.skipped += 1;
                }
            }
        }

        info!(due = summary.due, planned = summary.planned, "Dry-run tick complete");
        Ok(summary)
    }

    /// Fan a claimed job out and settle it as done or rescheduled
    async fn process_job(&self, job: &Job, session: &mut AuthSession) -> Result<Outcome> {
        info!(
            job_id = job.id,
            client = %job.client,
            content_type = %job.content_type,
            attempt = job.attempts,
            "Processing job"
        );

        let report = match self.fan_out(job, session).await {
            Ok(report) => report,
            Err(e) if e.is_storage() => return Err(e),
            Err(e) => {
                warn!(job_id = job.id, error = %e, "Job processing failed");
                let settled = self.retry_later(job, &format!("Processing error: {}", e)).await;
                return settle(job, settled.map(|_| Outcome::Rescheduled));
            }
        };

        if report.is_success() {
            let settled = self.db.mark_done(job.id).await.map(|_| Outcome::Done);
            if settled.is_ok() {
                info!(
                    job_id = job.id,
                    platforms = ?report.successful_platforms,
                    already_posted = ?report.already_posted,
                    "Job done"
                );
            }
            settle(job, settled)
        } else {
            warn!(
                job_id = job.id,
                failed = ?report.failed_platforms,
                skipped = ?report.skipped_platforms,
                "No platform accepted the job"
            );
            let settled = self.retry_later(job, ALL_PLATFORMS_FAILED).await;
            settle(job, settled.map(|_| Outcome::Rescheduled))
        }
    }

    async fn fan_out(&self, job: &Job, session: &mut AuthSession) -> Result<crate::fanout::FanOutReport> {
        let targets = self.provider.enabled_platforms(&job.client).await?;
        self.fanout.fan_out(job, &targets, session).await
    }

    async fn retry_later(&self, job: &Job, reason: &str) -> Result<()> {
        let eta = chrono::Utc::now()
            .timestamp()
            .saturating_add(self.settings.retry_delay.max(1));
        self.db.reschedule(job.id, eta, Some(reason)).await?;
        info!(job_id = job.id, eta, reason, "Job rescheduled");
        Ok(())
    }

    /// Sleep, tick, repeat until `shutdown` is set
    ///
    /// The flag is checked every second while sleeping. A tick that has
    /// started runs to completion. Tick errors are logged and the loop goes on.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        let interval = self.settings.poll_interval();
        info!(
            runner_id = %self.runner_id,
            poll_interval = interval.as_secs(),
            "Runner started"
        );

        loop {
            if !sleep_unless_shutdown(interval, &shutdown).await {
                break;
            }
            if let Err(e) = self.tick().await {
                error!(error = %e, "Tick failed");
            }
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
        }

        info!(runner_id = %self.runner_id, "Runner stopped");
    }
}

/// Storage errors propagate. Anything else means the job left in_progress
/// under us (operator cancel or reschedule, stale sweep) and is left as found.
fn settle(job: &Job, settled: Result<Outcome>) -> Result<Outcome> {
    match settled {
        Ok(outcome) => Ok(outcome),
        Err(e) if e.is_storage() => Err(e),
        Err(e) => {
            warn!(job_id = job.id, error = %e, "Job moved during processing, leaving it as is");
            Ok(Outcome::Moved)
        }
    }
}

/// Returns false when shutdown was requested before `total` elapsed
async fn sleep_unless_shutdown(total: Duration, shutdown: &AtomicBool) -> bool {
    let step = Duration::from_secs(1).min(total.max(Duration::from_millis(10)));
    let mut slept = Duration::ZERO;
    while slept < total {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        tokio::time::sleep(step).await;
        slept += step;
    }
    !shutdown.load(Ordering::Relaxed)
}
