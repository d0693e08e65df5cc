//! Facebook Page platform implementation (Graph API)

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::info;

use super::capabilities::{Capabilities, FACEBOOK};
use super::http::{post_id, required_credential, required_identifier, ApiClient};
use super::{ensure_extension, Platform};
use crate::error::{PlatformError, Result};
use crate::types::{file_extension, ClientPlatform, MediaKind, PostReceipt};

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v19.0";

pub struct FacebookPlatform {
    api: ApiClient,
    access_token: SecretString,
    page_id: String,
    authenticated: bool,
}

impl FacebookPlatform {
    /// Requires `FACEBOOK_ACCESS_TOKEN` and `FACEBOOK_PAGE_ID`
    pub fn new(config: &ClientPlatform) -> Result<Self> {
        Ok(Self {
            access_token: required_credential(config, "FACEBOOK_ACCESS_TOKEN")?,
            page_id: required_identifier(config, "FACEBOOK_PAGE_ID")?,
            api: ApiClient::new("facebook", DEFAULT_API_BASE, config)?,
            authenticated: false,
        })
    }

    async fn publish_to(
        &self,
        edge: &str,
        text_field: &str,
        path: &str,
        caption: Option<&str>,
    ) -> Result<PostReceipt> {
        if !self.authenticated {
            return Err(PlatformError::Authentication("facebook: not authenticated".to_string()).into());
        }
        let token = &self.access_token;
        let endpoint = format!("{}/{}", self.page_id, edge);
        let fields = [(text_field, caption.unwrap_or_default().to_string())];

        let response = self.api.upload(&endpoint, Some(token), "source", path, &fields).await?;
        let id = post_id("facebook", &response, &["post_id", "id"])?;

        let url = format!("https://facebook.com/{}", id);
        Ok(PostReceipt::new(id, Some(url)))
    }
}

#[async_trait]
impl Platform for FacebookPlatform {
    fn name(&self) -> &str {
        "facebook"
    }

    fn capabilities(&self) -> &Capabilities {
        &FACEBOOK
    }

    async fn authenticate(&mut self) -> Result<()> {
        self.api
            .get_json("me", Some(&self.access_token), &[("fields", "id")])
            .await?;
        self.authenticated = true;
        info!(platform = "facebook", page_id = %self.page_id, "Authenticated");
        Ok(())
    }

    async fn post_photo(&self, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        ensure_extension(&FACEBOOK, MediaKind::Photo, path)?;
        self.publish_to("photos", "message", path, caption).await
    }

    async fn post_video(&self, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        ensure_extension(&FACEBOOK, MediaKind::Video, path)?;
        self.publish_to("videos", "description", path, caption).await
    }

    /// Stories go to the page's photo or video edge depending on the file
    async fn post_story(&self, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        ensure_extension(&FACEBOOK, MediaKind::Story, path)?;
        if FACEBOOK.video_extensions.contains(&file_extension(path).as_str()) {
            self.publish_to("videos", "description", path, caption).await
        } else {
            self.publish_to("photos", "message", path, caption).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PostfanError;
    use crate::platforms::http::test_support::{mount_json, requests_seen};
    use wiremock::MockServer;
    use serde_json::json;
    use std::io::Write;

    fn config(base: &str) -> ClientPlatform {
        ClientPlatform::new("acme", "facebook")
            .with_credential("FACEBOOK_ACCESS_TOKEN", "EAAB")
            .with_credential("FACEBOOK_PAGE_ID", "1234")
            .with_setting("api_base", json!(base))
    }

    #[test]
    fn test_page_id_required() {
        let config =
            ClientPlatform::new("acme", "facebook").with_credential("FACEBOOK_ACCESS_TOKEN", "t");
        assert!(matches!(
            FacebookPlatform::new(&config),
            Err(PostfanError::Platform(PlatformError::Authentication(_)))
        ));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let server = MockServer::start().await;
        mount_json(&server, "GET", "/me", 401, json!({"error": {"message": "Session has expired"}})).await;
        let mut platform = FacebookPlatform::new(&config(&server.uri())).unwrap();
        let err = platform.authenticate().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Platform error: Authentication failed: facebook: Session has expired"
        );
    }

    #[tokio::test]
    async fn test_video_story_goes_to_video_edge() {
        let server = MockServer::start().await;
        mount_json(&server, "GET", "/me", 200, json!({"id": "1234"})).await;
        mount_json(&server, "POST", "/1234/videos", 200, json!({"id": "555"})).await;
        let mut story = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        story.write_all(b"mp4").unwrap();

        let mut platform = FacebookPlatform::new(&config(&server.uri())).unwrap();
        platform.authenticate().await.unwrap();
        let receipt = platform
            .post_story(story.path().to_str().unwrap(), None)
            .await
            .unwrap();

        assert_eq!(receipt.external_post_id, "555");
        assert_eq!(receipt.external_url.as_deref(), Some("https://facebook.com/555"));
        assert!(requests_seen(&server).await.contains(&"POST /1234/videos".to_string()));
    }
}
