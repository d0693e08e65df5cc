//! Client platform configuration

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::info;

use super::{now, Database};
use crate::error::{DbError, PostfanError, Result};
use crate::types::ClientPlatform;

/// Source of the platform configurations enabled for a client
///
/// The runner only ever asks this question, so a store, a static fixture or
/// a remote service can stand behind it.
#[async_trait]
pub trait ClientConfigProvider: Send + Sync {
    /// Enabled platform configurations for `client`, in platform-name order
    async fn enabled_platforms(&self, client: &str) -> Result<Vec<ClientPlatform>>;
}

#[async_trait]
impl ClientConfigProvider for Database {
    async fn enabled_platforms(&self, client: &str) -> Result<Vec<ClientPlatform>> {
        self.enabled_client_platforms(client).await
    }
}

fn json_map(raw: &str, column: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(DbError::CorruptRow(format!(
            "client_platforms.{} is not a JSON object",
            column
        ))
        .into()),
    }
}

fn client_platform_from_row(r: &SqliteRow) -> Result<ClientPlatform> {
    let credentials: String = r.get("credentials");
    let settings: String = r.get("settings");
    Ok(ClientPlatform {
        client: r.get("client"),
        platform: r.get("platform"),
        enabled: r.get::<i64, _>("enabled") != 0,
        credentials: json_map(&credentials, "credentials")?,
        settings: json_map(&settings, "settings")?,
    })
}

impl Database {
    /// Insert or replace a client's configuration for one platform
    pub async fn upsert_client_platform(&self, config: &ClientPlatform) -> Result<()> {
        if config.client.trim().is_empty() {
            return Err(PostfanError::InvalidInput("missing client".to_string()));
        }
        if config.platform.trim().is_empty() {
            return Err(PostfanError::InvalidInput("missing platform".to_string()));
        }

        let ts = now();
        sqlx::query(
            r#"
            INSERT INTO client_platforms (client, platform, enabled, credentials, settings, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(client, platform) DO UPDATE SET
                enabled = excluded.enabled,
                credentials = excluded.credentials,
                settings = excluded.settings,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(config.client.trim())
        .bind(config.platform.trim().to_lowercase())
        .bind(config.enabled as i64)
        .bind(Value::Object(config.credentials.clone()).to_string())
        .bind(Value::Object(config.settings.clone()).to_string())
        .bind(ts)
        .bind(ts)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        info!(
            client = %config.client,
            platform = %config.platform,
            enabled = config.enabled,
            "Saved client platform"
        );
        Ok(())
    }

    /// Flip the enabled flag; returns false when no such configuration exists
    pub async fn set_client_platform_enabled(
        &self,
        client: &str,
        platform: &str,
        enabled: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE client_platforms
            SET enabled = ?, updated_at = ?
            WHERE client = ? AND platform = ?
            "#,
        )
        .bind(enabled as i64)
        .bind(now())
        .bind(client)
        .bind(platform.to_lowercase())
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Every configuration, enabled or not, optionally for one client
    pub async fn list_client_platforms(&self, client: Option<&str>) -> Result<Vec<ClientPlatform>> {
        let rows = match client {
            Some(c) => {
                sqlx::query(
                    r#"
                    SELECT client, platform, enabled, credentials, settings
                    FROM client_platforms
                    WHERE client = ?
                    ORDER BY client ASC, platform ASC
                    "#,
                )
                .bind(c)
                .fetch_all(self.pool())
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT client, platform, enabled, credentials, settings
                    FROM client_platforms
                    ORDER BY client ASC, platform ASC
                    "#,
                )
                .fetch_all(self.pool())
                .await
            }
        }
        .map_err(DbError::SqlxError)?;

        rows.iter().map(client_platform_from_row).collect()
    }

    /// Enabled configurations for one client, in platform-name order
    pub async fn enabled_client_platforms(&self, client: &str) -> Result<Vec<ClientPlatform>> {
        let rows = sqlx::query(
            r#"
            SELECT client, platform, enabled, credentials, settings
            FROM client_platforms
            WHERE client = ? AND enabled = 1
            ORDER BY platform ASC
            "#,
        )
        .bind(client)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(client_platform_from_row).collect()
    }
}
