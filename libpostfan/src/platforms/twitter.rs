//! Twitter/X platform implementation

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::json;
use tracing::info;

use super::capabilities::{Capabilities, TWITTER};
use super::http::{post_id, required_credential, required_identifier, session, string_field, ApiClient};
use super::{ensure_extension, Platform};
use crate::error::{PlatformError, Result};
use crate::types::{ClientPlatform, MediaKind, PostReceipt};

const DEFAULT_API_BASE: &str = "https://api.twitter.com";

pub struct TwitterPlatform {
    api: ApiClient,
    api_key: String,
    api_secret: SecretString,
    access_token: SecretString,
    screen_name: Option<String>,
    authenticated: bool,
}

impl TwitterPlatform {
    /// Requires `TWITTER_API_KEY`, `TWITTER_API_SECRET` and `TWITTER_ACCESS_TOKEN`
    pub fn new(config: &ClientPlatform) -> Result<Self> {
        Ok(Self {
            api_key: required_identifier(config, "TWITTER_API_KEY")?,
            api_secret: required_credential(config, "TWITTER_API_SECRET")?,
            access_token: required_credential(config, "TWITTER_ACCESS_TOKEN")?,
            api: ApiClient::new("twitter", DEFAULT_API_BASE, config)?,
            screen_name: None,
            authenticated: false,
        })
    }

    fn user_token(&self) -> Result<&SecretString> {
        if !self.authenticated {
            return Err(PlatformError::Authentication("twitter: not authenticated".to_string()).into());
        }
        Ok(&self.access_token)
    }

    /// Upload the media, then publish a status that references it
    async fn tweet(&self, kind: MediaKind, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        ensure_extension(&TWITTER, kind, path)?;
        let token = self.user_token()?;

        let media = self
            .api
            .upload("1.1/media/upload.json", Some(token), "media", path, &[])
            .await?;
        let media_id = post_id("twitter", &media, &["media_id_string", "media_id"])?;

        let status = self
            .api
            .post_json(
                "1.1/statuses/update.json",
                Some(token),
                &json!({
                    "status": caption.unwrap_or_default(),
                    "media_ids": media_id,
                }),
            )
            .await?;
        let id = post_id("twitter", &status, &["id_str", "id"])?;

        let screen_name = self.screen_name.as_deref().unwrap_or("i/web");
        let url = format!("https://twitter.com/{}/status/{}", screen_name, id);
        Ok(PostReceipt::new(id, Some(url)))
    }
}

#[async_trait]
impl Platform for TwitterPlatform {
    fn name(&self) -> &str {
        "twitter"
    }

    fn capabilities(&self) -> &Capabilities {
        &TWITTER
    }

    async fn authenticate(&mut self) -> Result<()> {
        // App credentials first, so a revoked key is reported as such
        let app = self
            .api
            .post_form_basic(
                "oauth2/token",
                &self.api_key,
                &self.api_secret,
                &[("grant_type", "client_credentials")],
            )
            .await?;
        session("twitter", &string_field(&app, &["access_token"]).map(SecretString::from))?;

        let me = self
            .api
            .get_json("1.1/account/verify_credentials.json", Some(&self.access_token), &[])
            .await?;
        self.screen_name = string_field(&me, &["screen_name"]);
        self.authenticated = true;

        info!(platform = "twitter", screen_name = ?self.screen_name, "Authenticated");
        Ok(())
    }

    async fn post_photo(&self, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        self.tweet(MediaKind::Photo, path, caption).await
    }

    async fn post_video(&self, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        self.tweet(MediaKind::Video, path, caption).await
    }
}
