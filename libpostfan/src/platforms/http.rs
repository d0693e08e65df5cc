//! Shared HTTP transport for the platform adapters

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::error::{PlatformError, Result};
use crate::types::ClientPlatform;

const USER_AGENT: &str = concat!("postfan/", env!("CARGO_PKG_VERSION"));

/// JSON-over-HTTP client bound to one platform's API base URL
///
/// The base URL comes from the client's `api_base` setting when present,
/// otherwise from the adapter's default.
#[derive(Clone)]
pub struct ApiClient {
    platform: &'static str,
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(platform: &'static str, default_base: &str, config: &ClientPlatform) -> Result<Self> {
        let base_url = config
            .setting_str("api_base")
            .unwrap_or(default_base)
            .trim_end_matches('/')
            .to_string();

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PlatformError::Network(format!("{}: {}", platform, e)))?;

        Ok(Self {
            platform,
            http,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get_json(
        &self,
        path: &str,
        token: Option<&SecretString>,
        query: &[(&str, &str)],
    ) -> Result<Value> {
        let request = self.http.get(self.url(path)).query(query);
        self.send(with_token(request, token)).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        token: Option<&SecretString>,
        body: &Value,
    ) -> Result<Value> {
        let request = self.http.post(self.url(path)).json(body);
        self.send(with_token(request, token)).await
    }

    /// Form POST authenticated with HTTP basic credentials
    pub async fn post_form_basic(
        &self,
        path: &str,
        user: &str,
        password: &SecretString,
        form: &[(&str, &str)],
    ) -> Result<Value> {
        let request = self
            .http
            .post(self.url(path))
            .basic_auth(user, Some(password.expose_secret()))
            .form(form);
        self.send(request).await
    }

    /// Multipart upload of a local file plus plain text fields
    pub async fn upload(
        &self,
        path: &str,
        token: Option<&SecretString>,
        file_field: &str,
        file_path: &str,
        fields: &[(&str, String)],
    ) -> Result<Value> {
        let bytes = tokio::fs::read(file_path).await.map_err(|e| {
            PlatformError::Posting(format!("{}: cannot read {}: {}", self.platform, file_path, e))
        })?;
        let file_name = Path::new(file_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let mut form = Form::new().part(file_field.to_string(), Part::bytes(bytes).file_name(file_name));
        for (key, value) in fields {
            form = form.text(key.to_string(), value.clone());
        }

        let request = self.http.post(self.url(path)).multipart(form);
        self.send(with_token(request, token)).await
    }

    /// Exchange a username and password for a bearer token
    pub async fn login(
        &self,
        path: &str,
        username: &str,
        password: &SecretString,
    ) -> Result<SecretString> {
        let body = serde_json::json!({
            "username": username,
            "password": password.expose_secret(),
        });
        let response = self.post_json(path, None, &body).await?;
        string_field(&response, &["access_token", "token"])
            .map(SecretString::from)
            .ok_or_else(|| {
                PlatformError::Authentication(format!("{}: login response had no token", self.platform))
                    .into()
            })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| map_transport(self.platform, &e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_transport(self.platform, &e))?;

        debug!(platform = self.platform, status = status.as_u16(), "API response");

        if !status.is_success() {
            return Err(map_status(self.platform, status, &body).into());
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            PlatformError::Posting(format!("{}: unreadable response: {}", self.platform, e)).into()
        })
    }
}

fn with_token(request: RequestBuilder, token: Option<&SecretString>) -> RequestBuilder {
    match token {
        Some(t) => request.bearer_auth(t.expose_secret()),
        None => request,
    }
}

/// Map a non-success HTTP status to the platform error taxonomy
pub fn map_status(platform: &str, status: StatusCode, body: &str) -> PlatformError {
    let detail = api_message(body).unwrap_or_else(|| status.to_string());
    let message = format!("{}: {}", platform, detail);
    match status.as_u16() {
        401 | 403 => PlatformError::Authentication(message),
        429 => PlatformError::RateLimit(message),
        400..=499 => PlatformError::Posting(message),
        _ => PlatformError::Network(message),
    }
}

fn map_transport(platform: &str, err: &reqwest::Error) -> PlatformError {
    PlatformError::Network(format!("{}: {}", platform, err))
}

/// Pull a human readable message out of an error body, if it has one
fn api_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .or_else(|| value.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// First of `keys` present in `value` as a string or number
pub fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// External post id from a platform response
pub fn post_id(platform: &str, value: &Value, keys: &[&str]) -> Result<String> {
    string_field(value, keys).ok_or_else(|| {
        PlatformError::Posting(format!("{}: response had no post id", platform)).into()
    })
}

/// The session token, or an authentication error when `authenticate` never ran
pub fn session<'a>(platform: &str, token: &'a Option<SecretString>) -> Result<&'a SecretString> {
    token.as_ref().ok_or_else(|| {
        PlatformError::Authentication(format!("{}: not authenticated", platform)).into()
    })
}

/// Credential value or an authentication error naming what is missing
pub fn required_credential(config: &ClientPlatform, key: &str) -> Result<SecretString> {
    config
        .credential(key)
        .map(|v| SecretString::from(v.to_string()))
        .ok_or_else(|| {
            PlatformError::Authentication(format!(
                "{} credentials not provided: missing {}",
                config.platform, key
            ))
            .into()
        })
}

/// Plain (non-secret) credential value such as a page or channel id
pub fn required_identifier(config: &ClientPlatform, key: &str) -> Result<String> {
    config.credential(key).map(str::to_string).ok_or_else(|| {
        PlatformError::Authentication(format!(
            "{} credentials not provided: missing {}",
            config.platform, key
        ))
        .into()
    })
}
