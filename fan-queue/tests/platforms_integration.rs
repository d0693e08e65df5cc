//! Integration tests for fan-queue client platform configuration

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[tokio::test]
async fn test_set_and_list_hides_secrets() {
    let env = TestEnv::new();
    env.cmd()
        .args([
            "platforms",
            "set",
            "acme",
            "Facebook",
            "--credential",
            "FACEBOOK_ACCESS_TOKEN=EAAB-secret",
            "--credential",
            "FACEBOOK_PAGE_ID=1234",
            "--setting",
            "api_base=\"http://localhost:9000\"",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved facebook for acme (enabled)"));

    env.cmd()
        .args(["platforms", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("acme | facebook | enabled"))
        .stdout(predicate::str::contains("FACEBOOK_ACCESS_TOKEN"))
        .stdout(predicate::str::contains("EAAB-secret").not());

    env.cmd()
        .args(["platforms", "list", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("credential_keys"))
        .stdout(predicate::str::contains("EAAB-secret").not());

    let db = env.db().await;
    let configs = db.enabled_client_platforms("acme").await.unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].credential("FACEBOOK_ACCESS_TOKEN"), Some("EAAB-secret"));
    assert_eq!(configs[0].setting_str("api_base"), Some("http://localhost:9000"));
}

#[tokio::test]
async fn test_enable_disable() {
    let env = TestEnv::new();
    env.cmd()
        .args(["platforms", "set", "acme", "tiktok", "--disabled"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(disabled)"));

    let db = env.db().await;
    assert!(db.enabled_client_platforms("acme").await.unwrap().is_empty());

    env.cmd()
        .args(["platforms", "enable", "acme", "tiktok"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Enabled tiktok for acme"));
    assert_eq!(db.enabled_client_platforms("acme").await.unwrap().len(), 1);

    env.cmd()
        .args(["platforms", "disable", "acme", "tiktok"])
        .assert()
        .success();
    assert!(db.enabled_client_platforms("acme").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_enable_unconfigured_platform() {
    let env = TestEnv::new();
    env.cmd()
        .args(["platforms", "enable", "acme", "youtube"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("acme has no youtube configuration"));
}

#[tokio::test]
async fn test_set_unknown_platform() {
    let env = TestEnv::new();
    env.cmd()
        .args(["platforms", "set", "acme", "myspace"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("unknown platform 'myspace'"));
}

#[tokio::test]
async fn test_set_rejects_malformed_credential() {
    let env = TestEnv::new();
    env.cmd()
        .args(["platforms", "set", "acme", "twitter", "--credential", "TWITTER_API_KEY"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("expected KEY=VALUE"));
}

#[test]
fn test_capabilities_table() {
    let env = TestEnv::new();
    env.cmd()
        .arg("capabilities")
        .assert()
        .success()
        .stdout(predicate::str::contains("youtube"))
        .stdout(predicate::str::contains(".avi"));

    let output = env
        .cmd()
        .args(["capabilities", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let table: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(table["tiktok"]["supports_photo"], false);
    assert_eq!(table["instagram"]["supports_story"], true);
    assert_eq!(table.as_object().unwrap().len(), 6);
}
