//! YouTube Shorts platform implementation

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use std::path::Path;
use tracing::info;

use super::capabilities::{Capabilities, YOUTUBE};
use super::http::{post_id, required_identifier, session, string_field, ApiClient};
use super::{ensure_extension, Platform};
use crate::error::{PlatformError, Result};
use crate::types::{ClientPlatform, MediaKind, PostReceipt};

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Video uploads to one channel
///
/// `YOUTUBE_CREDENTIALS_FILE` points at an authorized-user JSON file holding
/// an OAuth access token (`token` or `access_token`).
pub struct YouTubePlatform {
    api: ApiClient,
    credentials_file: String,
    channel_id: String,
    token: Option<SecretString>,
}

impl YouTubePlatform {
    /// Requires `YOUTUBE_CREDENTIALS_FILE` and `YOUTUBE_CHANNEL_ID`
    pub fn new(config: &ClientPlatform) -> Result<Self> {
        Ok(Self {
            credentials_file: required_identifier(config, "YOUTUBE_CREDENTIALS_FILE")?,
            channel_id: required_identifier(config, "YOUTUBE_CHANNEL_ID")?,
            api: ApiClient::new("youtube", DEFAULT_API_BASE, config)?,
            token: None,
        })
    }

    async fn load_token(&self) -> Result<SecretString> {
        let path = shellexpand::tilde(&self.credentials_file).to_string();
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            PlatformError::Authentication(format!("youtube: cannot read {}: {}", path, e))
        })?;
        let value: Value = serde_json::from_str(&raw).map_err(|e| {
            PlatformError::Authentication(format!("youtube: invalid credentials file: {}", e))
        })?;
        string_field(&value, &["token", "access_token"])
            .map(SecretString::from)
            .ok_or_else(|| {
                PlatformError::Authentication("youtube: credentials file has no token".to_string())
                    .into()
            })
    }
}

#[async_trait]
impl Platform for YouTubePlatform {
    fn name(&self) -> &str {
        "youtube"
    }

    fn capabilities(&self) -> &Capabilities {
        &YOUTUBE
    }

    async fn authenticate(&mut self) -> Result<()> {
        let token = self.load_token().await?;
        let channels = self
            .api
            .get_json("channels", Some(&token), &[("part", "id"), ("id", self.channel_id.as_str())])
            .await?;

        let found = channels
            .get("items")
            .and_then(Value::as_array)
            .is_some_and(|items| !items.is_empty());
        if !found {
            return Err(PlatformError::Authentication(format!(
                "youtube: channel {} is not accessible with these credentials",
                self.channel_id
            ))
            .into());
        }

        self.token = Some(token);
        info!(platform = "youtube", channel_id = %self.channel_id, "Authenticated");
        Ok(())
    }

    async fn post_video(&self, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        ensure_extension(&YOUTUBE, MediaKind::Video, path)?;
        let token = session("youtube", &self.token)?;

        let title = caption
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                Path::new(path)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("Short")
                    .to_string()
            });
        let fields = [
            ("title", title),
            ("description", caption.unwrap_or_default().to_string()),
            ("channel_id", self.channel_id.clone()),
            ("privacy_status", "public".to_string()),
        ];

        let response = self
            .api
            .upload("videos?part=snippet,status", Some(token), "video", path, &fields)
            .await?;
        let id = post_id("youtube", &response, &["id"])?;

        let url = format!("https://youtube.com/shorts/{}", id);
        Ok(PostReceipt::new(id, Some(url)))
    }
}
