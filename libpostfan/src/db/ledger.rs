//! Per-platform post ledger: one row per (job, platform)

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::debug;

use super::{now, Database};
use crate::error::{DbError, PostfanError, Result};
use crate::types::{PlatformPost, PlatformPostStatus, PostReceipt};

const POST_COLUMNS: &str = "id, job_id, platform, external_post_id, external_url, status, \
                            error, posted_at, created_at";

fn post_from_row(r: &SqliteRow) -> Result<PlatformPost> {
    let status: String = r.get("status");
    Ok(PlatformPost {
        id: r.get("id"),
        job_id: r.get("job_id"),
        platform: r.get("platform"),
        external_post_id: r.get("external_post_id"),
        external_url: r.get("external_url"),
        status: status
            .parse()
            .map_err(|_| DbError::CorruptRow(format!("platform post status '{}'", status)))?,
        error: r.get("error"),
        posted_at: r.get("posted_at"),
        created_at: r.get("created_at"),
    })
}

/// Ledger row prepared for a fan-out pass
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub post: PlatformPost,
    /// The platform already accepted this job on an earlier pass
    pub already_posted: bool,
}

/// Aggregate ledger counts
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct LedgerStats {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_platform: BTreeMap<String, i64>,
}

/// A failed ledger row with the job details an operator needs to act on it
#[derive(Debug, Clone, Serialize)]
pub struct FailedPlatformPost {
    pub post: PlatformPost,
    pub client: String,
    pub path: String,
    pub content_type: String,
    pub caption: Option<String>,
}

impl Database {
    /// Create the pending ledger row for (job, platform), or reuse it
    ///
    /// A row that is already `posted` is returned untouched. Any other
    /// existing row is reset to `pending` for the new pass.
    pub async fn prepare_platform_post(&self, job_id: i64, platform: &str) -> Result<LedgerEntry> {
        let mut tx = self.pool().begin().await.map_err(DbError::SqlxError)?;

        let existing = sqlx::query(&format!(
            "SELECT {} FROM platform_posts WHERE job_id = ? AND platform = ?",
            POST_COLUMNS
        ))
        .bind(job_id)
        .bind(platform)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        let entry = match existing.as_ref().map(post_from_row).transpose()? {
            Some(post) if post.status == PlatformPostStatus::Posted => LedgerEntry {
                post,
                already_posted: true,
            },
            Some(post) => {
                let row = sqlx::query(&format!(
                    r#"
                    UPDATE platform_posts
                    SET status = 'pending', error = NULL
                    WHERE id = ?
                    RETURNING {}
                    "#,
                    POST_COLUMNS
                ))
                .bind(post.id)
                .fetch_one(&mut *tx)
                .await
                .map_err(DbError::SqlxError)?;
                LedgerEntry {
                    post: post_from_row(&row)?,
                    already_posted: false,
                }
            }
            None => {
                let row = sqlx::query(&format!(
                    r#"
                    INSERT INTO platform_posts (job_id, platform, status, created_at)
                    VALUES (?, ?, 'pending', ?)
                    RETURNING {}
                    "#,
                    POST_COLUMNS
                ))
                .bind(job_id)
                .bind(platform)
                .bind(now())
                .fetch_one(&mut *tx)
                .await
                .map_err(DbError::SqlxError)?;
                LedgerEntry {
                    post: post_from_row(&row)?,
                    already_posted: false,
                }
            }
        };

        tx.commit().await.map_err(DbError::SqlxError)?;
        debug!(job_id, platform, row_id = entry.post.id, "Prepared ledger row");
        Ok(entry)
    }

    /// Record a platform's acceptance of the post
    pub async fn mark_platform_posted(&self, post_id: i64, receipt: &PostReceipt) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE platform_posts
            SET status = 'posted',
                external_post_id = ?,
                external_url = ?,
                posted_at = ?,
                error = NULL
            WHERE id = ?
            "#,
        )
        .bind(&receipt.external_post_id)
        .bind(&receipt.external_url)
        .bind(receipt.timestamp)
        .bind(post_id)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(PostfanError::PlatformPostNotFound(post_id));
        }
        Ok(())
    }

    /// Record a platform's failure with the captured error text
    pub async fn mark_platform_failed(&self, post_id: i64, error: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE platform_posts
            SET status = 'failed',
                error = ?
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(post_id)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(PostfanError::PlatformPostNotFound(post_id));
        }
        Ok(())
    }

    /// Get one ledger row
    pub async fn get_platform_post(&self, post_id: i64) -> Result<Option<PlatformPost>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM platform_posts WHERE id = ?",
            POST_COLUMNS
        ))
        .bind(post_id)
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(post_from_row).transpose()
    }

    /// All ledger rows of a job, ordered by platform name
    pub async fn get_platform_posts(&self, job_id: i64) -> Result<Vec<PlatformPost>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM platform_posts WHERE job_id = ? ORDER BY platform ASC",
            POST_COLUMNS
        ))
        .bind(job_id)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Ledger counts, optionally narrowed to one platform and/or status
    pub async fn platform_post_stats(
        &self,
        platform: Option<&str>,
        status: Option<PlatformPostStatus>,
    ) -> Result<LedgerStats> {
        let mut where_clauses = vec!["1=1"];
        if platform.is_some() {
            where_clauses.push("platform = ?");
        }
        if status.is_some() {
            where_clauses.push("status = ?");
        }
        let where_clause = where_clauses.join(" AND ");

        let mut stats = LedgerStats::default();
        for (column, target) in [("status", &mut stats.by_status), ("platform", &mut stats.by_platform)] {
            let query_str = format!(
                "SELECT {col}, COUNT(*) FROM platform_posts WHERE {w} GROUP BY {col}",
                col = column,
                w = where_clause
            );
            let mut query = sqlx::query_as::<_, (String, i64)>(&query_str);
            if let Some(p) = platform {
                query = query.bind(p);
            }
            if let Some(s) = status {
                query = query.bind(s.as_str());
            }
            let rows = query
                .fetch_all(self.pool())
                .await
                .map_err(DbError::SqlxError)?;
            target.extend(rows);
        }

        stats.total = stats.by_status.values().sum();
        Ok(stats)
    }

    /// Most recent failed ledger rows
    pub async fn failed_platform_posts(&self, limit: u32) -> Result<Vec<FailedPlatformPost>> {
        let rows = sqlx::query(
            r#"
            SELECT pp.id, pp.job_id, pp.platform, pp.external_post_id, pp.external_url,
                   pp.status, pp.error, pp.posted_at, pp.created_at,
                   j.client, j.path, j.content_type, j.caption
            FROM platform_posts pp
            JOIN jobs j ON pp.job_id = j.id
            WHERE pp.status = 'failed'
            ORDER BY pp.created_at DESC, pp.id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                Ok(FailedPlatformPost {
                    post: post_from_row(r)?,
                    client: r.get("client"),
                    path: r.get("path"),
                    content_type: r.get("content_type"),
                    caption: r.get("caption"),
                })
            })
            .collect()
    }

    /// Reset a failed ledger row to pending
    ///
    /// Returns `false` when the row exists but is not failed.
    pub async fn retry_platform_post(&self, post_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE platform_posts
            SET status = 'pending', error = NULL
            WHERE id = ? AND status = 'failed'
            "#,
        )
        .bind(post_id)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        match self.get_platform_post(post_id).await? {
            Some(_) => Ok(false),
            None => Err(PostfanError::PlatformPostNotFound(post_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewJob;

    async fn db_with_job() -> (Database, i64) {
        let db = Database::in_memory().await.unwrap();
        let job_id = db
            .enqueue(NewJob::new("acme", "clip.mp4", "video").caption("launch"))
            .await
            .unwrap();
        (db, job_id)
    }

    #[tokio::test]
    async fn test_prepare_creates_pending_row() {
        let (db, job_id) = db_with_job().await;

        let entry = db.prepare_platform_post(job_id, "tiktok").await.unwrap();
        assert!(!entry.already_posted);
        assert_eq!(entry.post.status, PlatformPostStatus::Pending);
        assert_eq!(entry.post.platform, "tiktok");
        assert!(entry.post.external_post_id.is_none());

        let rows = db.get_platform_posts(job_id).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_prepare_is_unique_per_job_and_platform() {
        let (db, job_id) = db_with_job().await;

        let first = db.prepare_platform_post(job_id, "tiktok").await.unwrap();
        db.mark_platform_failed(first.post.id, "boom").await.unwrap();

        let second = db.prepare_platform_post(job_id, "tiktok").await.unwrap();
        assert_eq!(first.post.id, second.post.id);
        assert_eq!(second.post.status, PlatformPostStatus::Pending);
        assert!(second.post.error.is_none());
        assert_eq!(db.get_platform_posts(job_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_prepare_leaves_posted_rows_alone() {
        let (db, job_id) = db_with_job().await;

        let entry = db.prepare_platform_post(job_id, "youtube").await.unwrap();
        let receipt = PostReceipt::new("yt-1", Some("https://youtube.com/shorts/yt-1".to_string()));
        db.mark_platform_posted(entry.post.id, &receipt).await.unwrap();

        let again = db.prepare_platform_post(job_id, "youtube").await.unwrap();
        assert!(again.already_posted);
        assert_eq!(again.post.status, PlatformPostStatus::Posted);
        assert_eq!(again.post.external_post_id.as_deref(), Some("yt-1"));
    }

    #[tokio::test]
    async fn test_mark_posted_and_failed() {
        let (db, job_id) = db_with_job().await;
        let a = db.prepare_platform_post(job_id, "facebook").await.unwrap();
        let b = db.prepare_platform_post(job_id, "twitter").await.unwrap();

        db.mark_platform_posted(a.post.id, &PostReceipt::new("fb-9", None))
            .await
            .unwrap();
        db.mark_platform_failed(b.post.id, "Posting failed: media rejected")
            .await
            .unwrap();

        let fb = db.get_platform_post(a.post.id).await.unwrap().unwrap();
        assert_eq!(fb.status, PlatformPostStatus::Posted);
        assert_eq!(fb.external_post_id.as_deref(), Some("fb-9"));
        assert!(fb.posted_at.is_some());

        let tw = db.get_platform_post(b.post.id).await.unwrap().unwrap();
        assert_eq!(tw.status, PlatformPostStatus::Failed);
        assert_eq!(tw.error.as_deref(), Some("Posting failed: media rejected"));
    }

    #[tokio::test]
    async fn test_mark_unknown_row() {
        let (db, _) = db_with_job().await;
        assert!(matches!(
            db.mark_platform_failed(77, "x").await,
            Err(PostfanError::PlatformPostNotFound(77))
        ));
    }

    #[tokio::test]
    async fn test_stats_and_failed_listing() {
        let (db, job_id) = db_with_job().await;
        let a = db.prepare_platform_post(job_id, "instagram").await.unwrap();
        let b = db.prepare_platform_post(job_id, "tiktok").await.unwrap();
        db.prepare_platform_post(job_id, "youtube").await.unwrap();

        db.mark_platform_posted(a.post.id, &PostReceipt::new("ig", None))
            .await
            .unwrap();
        db.mark_platform_failed(b.post.id, "nope").await.unwrap();

        let stats = db.platform_post_stats(None, None).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status["posted"], 1);
        assert_eq!(stats.by_status["failed"], 1);
        assert_eq!(stats.by_status["pending"], 1);
        assert_eq!(stats.by_platform["tiktok"], 1);

        let narrowed = db
            .platform_post_stats(Some("tiktok"), Some(PlatformPostStatus::Failed))
            .await
            .unwrap();
        assert_eq!(narrowed.total, 1);

        let failed = db.failed_platform_posts(10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].post.platform, "tiktok");
        assert_eq!(failed[0].client, "acme");
        assert_eq!(failed[0].content_type, "reel");
        assert_eq!(failed[0].caption.as_deref(), Some("launch"));
    }

    #[tokio::test]
    async fn test_retry_resets_only_failed_rows() {
        let (db, job_id) = db_with_job().await;
        let a = db.prepare_platform_post(job_id, "tiktok").await.unwrap();
        let b = db.prepare_platform_post(job_id, "youtube").await.unwrap();
        db.mark_platform_failed(a.post.id, "nope").await.unwrap();
        db.mark_platform_posted(b.post.id, &PostReceipt::new("yt", None))
            .await
            .unwrap();

        assert!(db.retry_platform_post(a.post.id).await.unwrap());
        let row = db.get_platform_post(a.post.id).await.unwrap().unwrap();
        assert_eq!(row.status, PlatformPostStatus::Pending);
        assert!(row.error.is_none());

        assert!(!db.retry_platform_post(b.post.id).await.unwrap());
        assert!(matches!(
            db.retry_platform_post(999).await,
            Err(PostfanError::PlatformPostNotFound(999))
        ));
    }
}
