//! Job store: the durable queue and its status state machine

use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{append_log, now, Database};
use crate::error::{DbError, PostfanError, Result};
use crate::types::{ContentType, Job, JobStatus, NewJob};

const JOB_COLUMNS: &str = "id, client, path, content_type, caption, eta, status, extras, \
                           created_at, started_at, done_at, error, attempts, claimed_by";

fn job_from_row(r: &SqliteRow) -> Result<Job> {
    let status: String = r.get("status");
    let content_type: String = r.get("content_type");
    let extras: String = r.get("extras");

    Ok(Job {
        id: r.get("id"),
        client: r.get("client"),
        path: r.get("path"),
        content_type: content_type
            .parse::<ContentType>()
            .map_err(|_| DbError::CorruptRow(format!("content_type '{}'", content_type)))?,
        caption: r.get("caption"),
        eta: r.get("eta"),
        status: status
            .parse::<JobStatus>()
            .map_err(|_| DbError::CorruptRow(format!("job status '{}'", status)))?,
        // extras are opaque; an unreadable bag degrades to empty
        extras: serde_json::from_str::<Map<String, Value>>(&extras).unwrap_or_default(),
        created_at: r.get("created_at"),
        started_at: r.get("started_at"),
        done_at: r.get("done_at"),
        error: r.get("error"),
        attempts: r.get("attempts"),
        claimed_by: r.get("claimed_by"),
    })
}

impl Database {
    /// Insert a new queued job and return its id
    ///
    /// Client, path and content type are required. A missing eta means the
    /// job is due immediately.
    pub async fn enqueue(&self, new_job: NewJob) -> Result<i64> {
        let client = new_job.client.trim();
        if client.is_empty() {
            return Err(PostfanError::InvalidInput("missing client".to_string()));
        }
        if new_job.path.trim().is_empty() {
            return Err(PostfanError::InvalidInput("missing path".to_string()));
        }
        if new_job.content_type.trim().is_empty() {
            return Err(PostfanError::InvalidInput("missing content_type".to_string()));
        }
        let content_type: ContentType = new_job.content_type.parse()?;

        let path = new_job.path.trim().replace('\\', "/");
        let created_at = now();
        let eta = new_job.eta.unwrap_or(created_at);
        let extras = Value::Object(new_job.extras).to_string();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO jobs (client, path, content_type, caption, eta, status, extras, created_at, attempts)
            VALUES (?, ?, ?, ?, ?, 'queued', ?, ?, 0)
            RETURNING id
            "#,
        )
        .bind(client)
        .bind(&path)
        .bind(content_type.as_str())
        .bind(&new_job.caption)
        .bind(eta)
        .bind(extras)
        .bind(created_at)
        .fetch_one(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        info!(job_id = id, client, content_type = %content_type, eta, "Enqueued job");
        Ok(id)
    }

    /// Get a job by ID
    pub async fn get_job(&self, job_id: i64) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
            .bind(job_id)
            .fetch_optional(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn require_job(&self, job_id: i64) -> Result<Job> {
        self.get_job(job_id)
            .await?
            .ok_or(PostfanError::JobNotFound(job_id))
    }

    /// Queued jobs whose eta has passed, earliest deadline first
    pub async fn get_due(&self, limit: u32, client: Option<&str>) -> Result<Vec<Job>> {
        self.get_due_at(limit, client, now()).await
    }

    /// Same as [`Database::get_due`] with an explicit query time
    pub async fn get_due_at(&self, limit: u32, client: Option<&str>, at: i64) -> Result<Vec<Job>> {
        let client_clause = if client.is_some() { "AND client = ?" } else { "" };
        let query_str = format!(
            r#"
            SELECT {}
            FROM jobs
            WHERE status = 'queued'
              AND eta <= ?
              {}
            ORDER BY eta ASC, id ASC
            LIMIT ?
            "#,
            JOB_COLUMNS, client_clause
        );

        let mut query = sqlx::query(&query_str).bind(at);
        if let Some(c) = client {
            query = query.bind(c);
        }
        query = query.bind(limit as i64);

        let rows = query
            .fetch_all(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(job_from_row).collect()
    }

    /// List jobs, optionally filtered by status and client
    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        client: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Job>> {
        let mut where_clauses = vec!["1=1"];
        if status.is_some() {
            where_clauses.push("status = ?");
        }
        if client.is_some() {
            where_clauses.push("client = ?");
        }

        let query_str = format!(
            "SELECT {} FROM jobs WHERE {} ORDER BY eta ASC, id ASC LIMIT ?",
            JOB_COLUMNS,
            where_clauses.join(" AND ")
        );

        let mut query = sqlx::query(&query_str);
        if let Some(s) = status {
            query = query.bind(s.as_str());
        }
        if let Some(c) = client {
            query = query.bind(c);
        }
        query = query.bind(limit as i64);

        let rows = query
            .fetch_all(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(job_from_row).collect()
    }

    /// Transition queued -> in_progress
    ///
    /// This is a single conditional update, so of several callers racing for
    /// the same job exactly one wins; the others get `InvalidTransition`.
    pub async fn mark_in_progress(&self, job_id: i64) -> Result<Job> {
        self.claim_job(job_id, None).await
    }

    /// Claim a queued job on behalf of a named runner
    pub async fn claim_job(&self, job_id: i64, claimant: Option<&str>) -> Result<Job> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET status = 'in_progress',
                started_at = ?,
                attempts = attempts + 1,
                claimed_by = ?
            WHERE id = ? AND status = 'queued'
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(now())
        .bind(claimant)
        .bind(job_id)
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        match row {
            Some(r) => {
                let job = job_from_row(&r)?;
                debug!(job_id, attempts = job.attempts, "Claimed job");
                Ok(job)
            }
            None => Err(self.transition_error(job_id, JobStatus::InProgress).await),
        }
    }

    /// Transition in_progress -> done
    pub async fn mark_done(&self, job_id: i64) -> Result<Job> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET status = 'done',
                done_at = ?
            WHERE id = ? AND status = 'in_progress'
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(now())
        .bind(job_id)
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        match row {
            Some(r) => job_from_row(&r),
            None => Err(self.transition_error(job_id, JobStatus::Done).await),
        }
    }

    /// Put a job back in the queue with a new eta
    ///
    /// A reason is appended to the error log as `Rescheduled: {reason}`;
    /// earlier entries are kept. Terminal jobs cannot be rescheduled.
    pub async fn reschedule(&self, job_id: i64, new_eta: i64, reason: Option<&str>) -> Result<Job> {
        let entry = reason.map(|r| format!("Rescheduled: {}", r));
        self.move_to(job_id, JobStatus::Queued, &[JobStatus::Queued, JobStatus::InProgress], entry, |q| {
            q.eta = new_eta;
        })
        .await
    }

    /// Cancel a queued or in-progress job
    pub async fn cancel(&self, job_id: i64, reason: Option<&str>) -> Result<Job> {
        let entry = reason.map(|r| format!("Cancelled: {}", r));
        self.move_to(
            job_id,
            JobStatus::Cancelled,
            &[JobStatus::Queued, JobStatus::InProgress],
            entry,
            |_| {},
        )
        .await
    }

    /// Terminally fail a job; only reached through manual intervention
    pub async fn mark_failed(&self, job_id: i64, reason: &str) -> Result<Job> {
        self.move_to(
            job_id,
            JobStatus::Failed,
            &[JobStatus::Queued, JobStatus::InProgress],
            Some(format!("Failed: {}", reason)),
            |_| {},
        )
        .await
    }

    /// Requeue in-progress jobs whose claim is older than `threshold_secs`
    ///
    /// Returns the ids that were requeued. They become due at `at`.
    pub async fn requeue_stale(&self, threshold_secs: i64, at: i64) -> Result<Vec<i64>> {
        let cutoff = at.saturating_sub(threshold_secs);
        let stale: Vec<(i64, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT id, started_at FROM jobs
            WHERE status = 'in_progress'
              AND (started_at IS NULL OR started_at < ?)
            ORDER BY id ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        let mut requeued = Vec::with_capacity(stale.len());
        for (job_id, started_at) in stale {
            let entry = format!(
                "Requeued: stale in_progress since {}",
                started_at.map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string())
            );
            let moved = self
                .move_to(job_id, JobStatus::Queued, &[JobStatus::InProgress], Some(entry), |q| {
                    q.eta = at;
                })
                .await;
            match moved {
                Ok(_) => requeued.push(job_id),
                // finished between the scan and the update
                Err(PostfanError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        if !requeued.is_empty() {
            info!(count = requeued.len(), "Requeued stale in-progress jobs");
        }
        Ok(requeued)
    }

    /// Number of jobs per status, every status present
    pub async fn job_counts(&self) -> Result<BTreeMap<String, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .fetch_all(self.pool())
                .await
                .map_err(DbError::SqlxError)?;

        let mut counts: BTreeMap<String, i64> = JobStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        counts.extend(rows);
        Ok(counts)
    }

    /// Conditional status move that appends to, never replaces, the error log
    async fn move_to(
        &self,
        job_id: i64,
        target: JobStatus,
        allowed_from: &[JobStatus],
        log_entry: Option<String>,
        adjust: impl FnOnce(&mut JobUpdate),
    ) -> Result<Job> {
        let mut tx = self.pool().begin().await.map_err(DbError::SqlxError)?;

        let current: Option<(String, Option<String>, i64)> =
            sqlx::query_as("SELECT status, error, eta FROM jobs WHERE id = ?")
                .bind(job_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DbError::SqlxError)?;

        let (status, error, eta) = current.ok_or(PostfanError::JobNotFound(job_id))?;
        let from: JobStatus = status
            .parse()
            .map_err(|_| DbError::CorruptRow(format!("job status '{}'", status)))?;

        if !allowed_from.contains(&from) {
            return Err(PostfanError::InvalidTransition {
                job_id,
                from,
                to: target,
            });
        }

        let mut update = JobUpdate { eta };
        adjust(&mut update);

        let new_error = match log_entry {
            Some(entry) => Some(append_log(error.as_deref(), &entry)),
            None => error,
        };
        let done_at = if target.is_terminal() { Some(now()) } else { None };

        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET status = ?,
                eta = ?,
                error = ?,
                done_at = COALESCE(?, done_at),
                claimed_by = CASE WHEN ? = 'queued' THEN NULL ELSE claimed_by END
            WHERE id = ? AND status = ?
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(target.as_str())
        .bind(update.eta)
        .bind(&new_error)
        .bind(done_at)
        .bind(target.as_str())
        .bind(job_id)
        .bind(from.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        let job = match row {
            Some(r) => job_from_row(&r)?,
            None => {
                return Err(PostfanError::InvalidTransition {
                    job_id,
                    from,
                    to: target,
                })
            }
        };

        tx.commit().await.map_err(DbError::SqlxError)?;
        debug!(job_id, from = %from, to = %target, "Job status changed");
        Ok(job)
    }

    async fn transition_error(&self, job_id: i64, target: JobStatus) -> PostfanError {
        match self.require_job(job_id).await {
            Ok(job) => PostfanError::InvalidTransition {
                job_id,
                from: job.status,
                to: target,
            },
            Err(e) => e,
        }
    }
}

struct JobUpdate {
    eta: i64,
}
