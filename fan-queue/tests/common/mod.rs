//! Shared helpers for fan-queue integration tests

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

/// Config file plus database location inside a temp dir
pub struct TestEnv {
    pub dir: TempDir,
    pub config_path: String,
    pub db_path: String,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        let db_path = dir.path().join("data").join("queue.db");

        let config_content = format!(
            r#"
[database]
path = "{}"

[scheduler]
stale_after = 1800
"#,
            escape_path_for_toml(&db_path.to_string_lossy())
        );
        fs::write(&config_path, config_content).unwrap();

        Self {
            config_path: config_path.to_string_lossy().to_string(),
            db_path: db_path.to_string_lossy().to_string(),
            dir,
        }
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("fan-queue").unwrap();
        cmd.env("POSTFAN_CONFIG", &self.config_path)
            .env_remove("POSTFAN_DB_PATH")
            .env_remove("RUST_LOG");
        cmd
    }

    pub async fn db(&self) -> libpostfan::Database {
        libpostfan::Database::new(&self.db_path).await.unwrap()
    }

    /// Enqueue through the CLI and return the new job id
    pub fn enqueue(&self, args: &[&str]) -> i64 {
        let output = self
            .cmd()
            .arg("enqueue")
            .args(args)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        String::from_utf8(output).unwrap().trim().parse().unwrap()
    }
}
