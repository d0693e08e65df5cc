//! LinkedIn platform implementation

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::info;

use super::capabilities::{Capabilities, LINKEDIN};
use super::http::{post_id, required_credential, required_identifier, session, ApiClient};
use super::{ensure_extension, Platform};
use crate::error::Result;
use crate::types::{ClientPlatform, MediaKind, PostReceipt};

const DEFAULT_API_BASE: &str = "https://api.linkedin.com/v2";

pub struct LinkedInPlatform {
    api: ApiClient,
    username: String,
    password: SecretString,
    token: Option<SecretString>,
}

impl LinkedInPlatform {
    /// Requires `LINKEDIN_USERNAME` and `LINKEDIN_PASSWORD`
    pub fn new(config: &ClientPlatform) -> Result<Self> {
        Ok(Self {
            username: required_identifier(config, "LINKEDIN_USERNAME")?,
            password: required_credential(config, "LINKEDIN_PASSWORD")?,
            api: ApiClient::new("linkedin", DEFAULT_API_BASE, config)?,
            token: None,
        })
    }

    async fn share(&self, kind: MediaKind, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        ensure_extension(&LINKEDIN, kind, path)?;
        let token = session("linkedin", &self.token)?;

        let fields = [
            ("media_type", kind.to_string()),
            ("commentary", caption.unwrap_or_default().to_string()),
        ];
        let response = self.api.upload("shares", Some(token), "media", path, &fields).await?;
        let id = post_id("linkedin", &response, &["id", "urn"])?;

        let url = format!("https://www.linkedin.com/feed/update/{}", id);
        Ok(PostReceipt::new(id, Some(url)))
    }
}

#[async_trait]
impl Platform for LinkedInPlatform {
    fn name(&self) -> &str {
        "linkedin"
    }

    fn capabilities(&self) -> &Capabilities {
        &LINKEDIN
    }

    async fn authenticate(&mut self) -> Result<()> {
        self.token = Some(self.api.login("login", &self.username, &self.password).await?);
        info!(platform = "linkedin", "Authenticated");
        Ok(())
    }

    async fn post_photo(&self, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        self.share(MediaKind::Photo, path, caption).await
    }

    async fn post_video(&self, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        self.share(MediaKind::Video, path, caption).await
    }
}
