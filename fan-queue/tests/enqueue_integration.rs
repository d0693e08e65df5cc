//! Integration tests for fan-queue enqueue, list and show

mod common;

use common::TestEnv;
use libpostfan::{ContentType, JobStatus};
use predicates::prelude::*;

#[tokio::test]
async fn test_enqueue_prints_id_and_stores_job() {
    let env = TestEnv::new();
    let id = env.enqueue(&[
        "--client",
        "acme",
        "--path",
        "media/clip.mp4",
        "--type",
        "video",
        "--caption",
        "Launch day",
        "--extra",
        "campaign=\"spring\"",
        "--extra",
        "priority=2",
    ]);

    let db = env.db().await;
    let job = db.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.client, "acme");
    assert_eq!(job.content_type, ContentType::VideoReel);
    assert_eq!(job.caption.as_deref(), Some("Launch day"));
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.extras["campaign"], "spring");
    assert_eq!(job.extras["priority"], 2);
    assert!(job.eta <= chrono::Utc::now().timestamp());
}

#[tokio::test]
async fn test_enqueue_relative_time() {
    let env = TestEnv::new();
    let before = chrono::Utc::now().timestamp();
    let id = env.enqueue(&[
        "--client", "acme", "--path", "a.jpg", "--type", "feed", "--at", "2h",
    ]);

    let job = env.db().await.get_job(id).await.unwrap().unwrap();
    assert!(job.eta >= before + 7200);
    assert!(job.eta <= before + 7210);
}

#[tokio::test]
async fn test_enqueue_json_output() {
    let env = TestEnv::new();
    env.cmd()
        .args([
            "enqueue", "--client", "acme", "--path", "a.jpg", "--type", "story", "--format", "json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""content_type": "story""#))
        .stdout(predicate::str::contains(r#""status": "queued""#));
}

#[tokio::test]
async fn test_enqueue_rejects_unknown_content_type() {
    let env = TestEnv::new();
    env.cmd()
        .args(["enqueue", "--client", "acme", "--path", "a.jpg", "--type", "carousel"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("unknown content_type 'carousel'"));
}

#[tokio::test]
async fn test_enqueue_rejects_empty_client() {
    let env = TestEnv::new();
    env.cmd()
        .args(["enqueue", "--client", " ", "--path", "a.jpg", "--type", "feed"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("missing client"));
}

#[tokio::test]
async fn test_enqueue_rejects_bad_time() {
    let env = TestEnv::new();
    env.cmd()
        .args([
            "enqueue", "--client", "acme", "--path", "a.jpg", "--type", "feed", "--at", "someday maybe",
        ])
        .assert()
        .code(3);
}

#[tokio::test]
async fn test_list_empty_queue() {
    let env = TestEnv::new();
    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[tokio::test]
async fn test_list_orders_by_eta_and_filters() {
    let env = TestEnv::new();
    let later = env.enqueue(&[
        "--client", "acme", "--path", "later.jpg", "--type", "feed", "--at", "3h",
    ]);
    let sooner = env.enqueue(&[
        "--client", "acme", "--path", "sooner.jpg", "--type", "feed", "--at", "1h",
    ]);
    env.enqueue(&["--client", "globex", "--path", "other.jpg", "--type", "feed"]);

    let output = env
        .cmd()
        .args(["list", "--client", "acme"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).unwrap();

    assert!(!stdout.contains("other.jpg"));
    let pos_sooner = stdout.find(&format!("{} |", sooner)).unwrap();
    let pos_later = stdout.find(&format!("{} |", later)).unwrap();
    assert!(pos_sooner < pos_later);
    assert!(stdout.contains("in 1 hour") || stdout.contains("in 59 minutes"));
}

#[tokio::test]
async fn test_list_json_and_status_filter() {
    let env = TestEnv::new();
    let keep = env.enqueue(&["--client", "acme", "--path", "a.jpg", "--type", "feed"]);
    let gone = env.enqueue(&["--client", "acme", "--path", "b.jpg", "--type", "feed"]);
    env.cmd().args(["cancel", &gone.to_string()]).assert().success();

    let output = env
        .cmd()
        .args(["list", "--status", "queued", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let jobs: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let ids: Vec<i64> = jobs
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![keep]);
}

#[tokio::test]
async fn test_list_rejects_unknown_status() {
    let env = TestEnv::new();
    env.cmd()
        .args(["list", "--status", "lost"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("unknown job status"));
}

#[tokio::test]
async fn test_show_job_with_ledger() {
    let env = TestEnv::new();
    let id = env.enqueue(&["--client", "acme", "--path", "clip.mp4", "--type", "reel"]);

    let db = env.db().await;
    let entry = db.prepare_platform_post(id, "tiktok").await.unwrap();
    db.mark_platform_failed(entry.post.id, "Network error: reset").await.unwrap();

    env.cmd()
        .args(["show", &id.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Client:       acme"))
        .stdout(predicate::str::contains("tiktok failed Network error: reset"));
}

#[tokio::test]
async fn test_show_missing_job() {
    let env = TestEnv::new();
    env.cmd()
        .args(["show", "999"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Job not found: 999"));
}
