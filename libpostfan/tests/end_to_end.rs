//! End-to-end runner workflows against an on-disk database
//!
//! These tests drive complete ticks:
//! - Enqueue, claim, fan out, settle
//! - Partial and total platform failure
//! - Capability filtering before any network call
//! - Hanging and panicking adapters

use anyhow::Result;
use libpostfan::config::SchedulerConfig;
use libpostfan::db::Database;
use libpostfan::error::PlatformError;
use libpostfan::fanout::FanOutManager;
use libpostfan::platforms::capabilities::{Capabilities, FACEBOOK, INSTAGRAM, YOUTUBE};
use libpostfan::platforms::mock::{MockConfig, MockPlatform};
use libpostfan::platforms::PlatformRegistry;
use libpostfan::runner::Runner;
use libpostfan::types::{ClientPlatform, JobStatus, NewJob, PlatformPostStatus};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> Result<(TempDir, Database)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("queue.db");
    let db = Database::new(&db_path.to_string_lossy()).await?;
    Ok((temp_dir, db))
}

fn runner(db: &Database, mocks: &[&MockConfig]) -> Runner {
    let mut registry = PlatformRegistry::new();
    for mock in mocks {
        registry.register(&mock.name, mock.capabilities, MockPlatform::factory((*mock).clone()));
    }
    let fanout = FanOutManager::new(db.clone(), registry).with_timeout(Duration::from_millis(300));
    Runner::new(db.clone(), fanout, Arc::new(db.clone()), SchedulerConfig::default())
}

async fn enable(db: &Database, client: &str, platform: &str, enabled: bool) -> Result<()> {
    let mut config = ClientPlatform::new(client, platform);
    config.enabled = enabled;
    db.upsert_client_platform(&config).await?;
    Ok(())
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[tokio::test]
async fn test_acme_posts_only_to_enabled_platform() -> Result<()> {
    let (_dir, db) = create_test_db().await?;
    let x = MockConfig::new("x", YOUTUBE);
    let y = MockConfig::new("y", YOUTUBE);
    enable(&db, "Acme", "x", true).await?;
    enable(&db, "Acme", "y", false).await?;

    let id = db
        .enqueue(NewJob::new("Acme", "clip.mp4", "video").eta(now()))
        .await?;

    let due = db.get_due(10, None).await?;
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, id);

    let summary = runner(&db, &[&x, &y]).tick().await?;
    assert_eq!(summary.done, 1);

    let rows = db.get_platform_posts(id).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].platform, "x");
    assert_eq!(rows[0].status, PlatformPostStatus::Posted);
    assert_eq!(y.created(), 0);
    assert_eq!(y.post_calls(), 0);

    let job = db.get_job(id).await?.unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.done_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_acme_requeued_when_enabled_platform_fails() -> Result<()> {
    let (_dir, db) = create_test_db().await?;
    let x = MockConfig::new("x", YOUTUBE).post_failure(PlatformError::Network("reset".to_string()));
    let y = MockConfig::new("y", YOUTUBE);
    enable(&db, "Acme", "x", true).await?;
    enable(&db, "Acme", "y", false).await?;

    let eta = now();
    let id = db.enqueue(NewJob::new("Acme", "clip.mp4", "video").eta(eta)).await?;

    runner(&db, &[&x, &y]).tick().await?;

    let job = db.get_job(id).await?.unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert!(job.eta > eta);
    assert_eq!(job.error.as_deref(), Some("Rescheduled: All platforms failed"));

    let rows = db.get_platform_posts(id).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, PlatformPostStatus::Failed);
    assert_eq!(rows[0].error.as_deref(), Some("Network error: reset"));
    Ok(())
}

#[tokio::test]
async fn test_partial_success_marks_job_done() -> Result<()> {
    let (_dir, db) = create_test_db().await?;
    let a = MockConfig::new("facebook", FACEBOOK);
    let b = MockConfig::new("instagram", INSTAGRAM)
        .post_failure(PlatformError::Posting("aspect ratio".to_string()));
    enable(&db, "acme", "facebook", true).await?;
    enable(&db, "acme", "instagram", true).await?;

    let id = db
        .enqueue(NewJob::new("acme", "shot.jpg", "feed").caption("launch").eta(now()))
        .await?;
    runner(&db, &[&a, &b]).tick().await?;

    let job = db.get_job(id).await?.unwrap();
    assert_eq!(job.status, JobStatus::Done);

    let rows = db.get_platform_posts(id).await?;
    let facebook = rows.iter().find(|r| r.platform == "facebook").unwrap();
    assert_eq!(facebook.status, PlatformPostStatus::Posted);
    assert!(facebook.external_post_id.is_some());
    let instagram = rows.iter().find(|r| r.platform == "instagram").unwrap();
    assert_eq!(instagram.status, PlatformPostStatus::Failed);
    assert!(instagram.error.is_some());
    Ok(())
}

#[tokio::test]
async fn test_unsupported_content_makes_no_calls() -> Result<()> {
    let (_dir, db) = create_test_db().await?;
    let photos = MockConfig::new(
        "photos",
        Capabilities {
            supports_video: false,
            video_extensions: &[],
            ..INSTAGRAM
        },
    );
    enable(&db, "acme", "photos", true).await?;

    let eta = now();
    let id = db.enqueue(NewJob::new("acme", "clip.mp4", "video").eta(eta)).await?;
    runner(&db, &[&photos]).tick().await?;

    assert!(db.get_platform_posts(id).await?.is_empty());
    assert_eq!(photos.created(), 0);
    assert_eq!(photos.auth_calls(), 0);
    assert_eq!(photos.post_calls(), 0);

    let job = db.get_job(id).await?.unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert!(job.eta > eta);
    Ok(())
}

#[tokio::test]
async fn test_hang_and_panic_do_not_sink_siblings() -> Result<()> {
    let (_dir, db) = create_test_db().await?;
    let slow = MockConfig::new("slow", YOUTUBE).with_delay(Duration::from_secs(10));
    let boom = MockConfig::new("boom", YOUTUBE).panicking();
    let fine = MockConfig::new("fine", YOUTUBE);
    for name in ["slow", "boom", "fine"] {
        enable(&db, "acme", name, true).await?;
    }

    let id = db.enqueue(NewJob::new("acme", "clip.mp4", "video").eta(now())).await?;
    let started = std::time::Instant::now();
    runner(&db, &[&slow, &boom, &fine]).tick().await?;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(db.get_job(id).await?.unwrap().status, JobStatus::Done);
    let rows = db.get_platform_posts(id).await?;
    let status = |name: &str| rows.iter().find(|r| r.platform == name).unwrap().status;
    assert_eq!(status("fine"), PlatformPostStatus::Posted);
    assert_eq!(status("slow"), PlatformPostStatus::Failed);
    assert_eq!(status("boom"), PlatformPostStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_retry_reposts_only_failed_platform() -> Result<()> {
    let (_dir, db) = create_test_db().await?;
    let good = MockConfig::new("good", YOUTUBE);
    let flaky = MockConfig::new("flaky", YOUTUBE).post_failure(PlatformError::RateLimit("429".to_string()));
    enable(&db, "acme", "good", true).await?;
    enable(&db, "acme", "flaky", true).await?;

    let id = db.enqueue(NewJob::new("acme", "clip.mp4", "video").eta(now())).await?;
    runner(&db, &[&good, &flaky]).tick().await?;
    assert_eq!(db.get_job(id).await?.unwrap().status, JobStatus::Done);

    let failed = db.failed_platform_posts(10).await?;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].post.platform, "flaky");
    assert!(db.retry_platform_post(failed[0].post.id).await?);

    let stats = db.platform_post_stats(None, None).await?;
    assert_eq!(stats.total, 2);
    assert_eq!(stats.by_status.get("pending"), Some(&1));
    assert_eq!(stats.by_status.get("posted"), Some(&1));
    Ok(())
}
