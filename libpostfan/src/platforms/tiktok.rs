//! TikTok platform implementation

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::info;

use super::capabilities::{Capabilities, TIKTOK};
use super::http::{post_id, required_credential, required_identifier, session, ApiClient};
use super::{ensure_extension, Platform};
use crate::error::Result;
use crate::types::{ClientPlatform, MediaKind, PostReceipt};

const DEFAULT_API_BASE: &str = "https://open.tiktokapis.com/v2";

pub struct TikTokPlatform {
    api: ApiClient,
    username: String,
    password: SecretString,
    token: Option<SecretString>,
}

impl TikTokPlatform {
    /// Requires `TIKTOK_USERNAME` and `TIKTOK_PASSWORD`
    pub fn new(config: &ClientPlatform) -> Result<Self> {
        Ok(Self {
            username: required_identifier(config, "TIKTOK_USERNAME")?,
            password: required_credential(config, "TIKTOK_PASSWORD")?,
            api: ApiClient::new("tiktok", DEFAULT_API_BASE, config)?,
            token: None,
        })
    }
}

#[async_trait]
impl Platform for TikTokPlatform {
    fn name(&self) -> &str {
        "tiktok"
    }

    fn capabilities(&self) -> &Capabilities {
        &TIKTOK
    }

    async fn authenticate(&mut self) -> Result<()> {
        self.token = Some(self.api.login("oauth/login", &self.username, &self.password).await?);
        info!(platform = "tiktok", username = %self.username, "Authenticated");
        Ok(())
    }

    async fn post_video(&self, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        ensure_extension(&TIKTOK, MediaKind::Video, path)?;
        let token = session("tiktok", &self.token)?;

        let fields = [("title", caption.unwrap_or_default().to_string())];
        let response = self
            .api
            .upload("post/publish/video/upload", Some(token), "video", path, &fields)
            .await?;
        let id = post_id("tiktok", &response, &["publish_id", "id"])?;

        let url = format!("https://tiktok.com/@{}/video/{}", self.username, id);
        Ok(PostReceipt::new(id, Some(url)))
    }
}
