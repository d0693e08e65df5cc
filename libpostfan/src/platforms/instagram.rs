//! Instagram platform implementation

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::info;

use super::capabilities::{Capabilities, INSTAGRAM};
use super::http::{post_id, required_credential, required_identifier, session, string_field, ApiClient};
use super::{ensure_extension, Platform};
use crate::error::Result;
use crate::types::{ClientPlatform, MediaKind, PostReceipt};

const DEFAULT_API_BASE: &str = "https://i.instagram.com/api/v1";

/// Instagram feed, reel and story publishing for one account
pub struct InstagramPlatform {
    api: ApiClient,
    username: String,
    password: SecretString,
    token: Option<SecretString>,
}

impl InstagramPlatform {
    /// Requires `IG_USERNAME` and `IG_PASSWORD`
    pub fn new(config: &ClientPlatform) -> Result<Self> {
        Ok(Self {
            username: required_identifier(config, "IG_USERNAME")?,
            password: required_credential(config, "IG_PASSWORD")?,
            api: ApiClient::new("instagram", DEFAULT_API_BASE, config)?,
            token: None,
        })
    }

    async fn upload(
        &self,
        kind: MediaKind,
        endpoint: &str,
        path: &str,
        caption: Option<&str>,
    ) -> Result<serde_json::Value> {
        ensure_extension(&INSTAGRAM, kind, path)?;
        let token = session("instagram", &self.token)?;
        let fields = [("caption", caption.unwrap_or_default().to_string())];
        self.api.upload(endpoint, Some(token), "file", path, &fields).await
    }
}

#[async_trait]
impl Platform for InstagramPlatform {
    fn name(&self) -> &str {
        "instagram"
    }

    fn capabilities(&self) -> &Capabilities {
        &INSTAGRAM
    }

    async fn authenticate(&mut self) -> Result<()> {
        let token = self
            .api
            .login("accounts/login", &self.username, &self.password)
            .await?;
        self.token = Some(token);
        info!(platform = "instagram", username = %self.username, "Authenticated");
        Ok(())
    }

    async fn post_photo(&self, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        let response = self.upload(MediaKind::Photo, "media/photo", path, caption).await?;
        let code = post_id("instagram", &response, &["code", "id", "pk"])?;
        let url = format!("https://instagram.com/p/{}", code);
        Ok(PostReceipt::new(code, Some(url)))
    }

    async fn post_video(&self, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        let response = self.upload(MediaKind::Video, "media/video", path, caption).await?;
        let code = post_id("instagram", &response, &["code", "id", "pk"])?;
        let url = format!("https://instagram.com/p/{}", code);
        Ok(PostReceipt::new(code, Some(url)))
    }

    async fn post_story(&self, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        let response = self.upload(MediaKind::Story, "media/story", path, caption).await?;
        let pk = post_id("instagram", &response, &["pk", "id"])?;
        let url = string_field(&response, &["url"])
            .unwrap_or_else(|| format!("https://instagram.com/stories/{}/{}", self.username, pk));
        Ok(PostReceipt::new(pk, Some(url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PlatformError, PostfanError};
    use crate::platforms::http::test_support::{mount_json, requests_seen};
    use wiremock::MockServer;
    use serde_json::json;
    use std::io::Write;

    fn config(base: &str) -> ClientPlatform {
        ClientPlatform::new("acme", "instagram")
            .with_credential("IG_USERNAME", "acme.official")
            .with_credential("IG_PASSWORD", "hunter2")
            .with_setting("api_base", json!(base))
    }

    #[test]
    fn test_missing_credentials() {
        let config = ClientPlatform::new("acme", "instagram").with_credential("IG_USERNAME", "a");
        assert!(matches!(
            InstagramPlatform::new(&config),
            Err(PostfanError::Platform(PlatformError::Authentication(_)))
        ));
    }

    #[tokio::test]
    async fn test_post_requires_authentication() {
        let platform = InstagramPlatform::new(&config("http://127.0.0.1:1")).unwrap();
        let err = platform.post_photo("a.jpg", None).await.unwrap_err();
        assert!(err.to_string().contains("not authenticated"));
    }

    #[tokio::test]
    async fn test_rejects_extension_before_network() {
        let mut platform = InstagramPlatform::new(&config("http://127.0.0.1:1")).unwrap();
        platform.token = Some(SecretString::from("t".to_string()));
        let err = platform.post_photo("a.gif", None).await.unwrap_err();
        assert!(matches!(err, PostfanError::Platform(PlatformError::Validation(_))));
    }

    #[tokio::test]
    async fn test_login_then_photo() {
        let server = MockServer::start().await;
        mount_json(&server, "POST", "/accounts/login", 200, json!({"token": "s-1"})).await;
        mount_json(&server, "POST", "/media/photo", 200, json!({"code": "Cabc"})).await;

        let mut file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        file.write_all(b"jpeg").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let mut platform = InstagramPlatform::new(&config(&server.uri())).unwrap();
        platform.authenticate().await.unwrap();
        let receipt = platform.post_photo(&path, Some("hello")).await.unwrap();

        assert_eq!(receipt.external_post_id, "Cabc");
        assert_eq!(receipt.external_url.as_deref(), Some("https://instagram.com/p/Cabc"));
        assert_eq!(
            requests_seen(&server).await,
            vec!["POST /accounts/login".to_string(), "POST /media/photo".to_string()]
        );
    }
}
