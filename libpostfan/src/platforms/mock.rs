//! Mock platform implementation for testing
//!
//! A configurable stand-in for a real adapter: scripted authentication and
//! posting failures, artificial latency, hangs and panics, and shared call
//! counters so a test can see what the fan-out actually did. Counters live
//! behind `Arc`s in [`MockConfig`], so every adapter built from one config
//! (for example by a registry factory, once per tick) reports into the same
//! place.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use super::capabilities::Capabilities;
use super::registry::PlatformFactory;
use super::Platform;
use crate::error::{PlatformError, Result};
use crate::types::{ClientPlatform, MediaKind, PostReceipt};

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub name: String,
    pub capabilities: Capabilities,

    /// Returned by the factory instead of an adapter
    pub construction_error: Option<PlatformError>,
    pub auth_error: Option<PlatformError>,
    pub post_error: Option<PlatformError>,

    /// Latency before every authenticate and post
    pub delay: Duration,
    pub panic_on_post: bool,

    created: Arc<Mutex<usize>>,
    auth_calls: Arc<Mutex<usize>>,
    post_calls: Arc<Mutex<usize>>,
    posted: Arc<Mutex<Vec<(MediaKind, String, Option<String>)>>>,
}

impl MockConfig {
    pub fn new(name: &str, capabilities: Capabilities) -> Self {
        Self {
            name: name.to_string(),
            capabilities,
            construction_error: None,
            auth_error: None,
            post_error: None,
            delay: Duration::ZERO,
            panic_on_post: false,
            created: Arc::new(Mutex::new(0)),
            auth_calls: Arc::new(Mutex::new(0)),
            post_calls: Arc::new(Mutex::new(0)),
            posted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn auth_failure(mut self, message: &str) -> Self {
        self.auth_error = Some(PlatformError::Authentication(message.to_string()));
        self
    }

    pub fn post_failure(mut self, error: PlatformError) -> Self {
        self.post_error = Some(error);
        self
    }

    pub fn missing_credentials(mut self) -> Self {
        self.construction_error = Some(PlatformError::Authentication(format!(
            "{} credentials not provided",
            self.name
        )));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_post = true;
        self
    }

    /// Adapters built from this config
    pub fn created(&self) -> usize {
        *self.created.lock().unwrap()
    }

    pub fn auth_calls(&self) -> usize {
        *self.auth_calls.lock().unwrap()
    }

    pub fn post_calls(&self) -> usize {
        *self.post_calls.lock().unwrap()
    }

    /// Successful posts as (kind, path, caption)
    pub fn posted(&self) -> Vec<(MediaKind, String, Option<String>)> {
        self.posted.lock().unwrap().clone()
    }
}

/// Mock platform for testing
pub struct MockPlatform {
    config: MockConfig,
    authenticated: bool,
}

impl MockPlatform {
    pub fn new(name: &str, capabilities: Capabilities) -> Self {
        Self::from_config(MockConfig::new(name, capabilities))
    }

    pub fn from_config(config: MockConfig) -> Self {
        Self {
            config,
            authenticated: false,
        }
    }

    /// Registry factory producing adapters that share `config`'s counters
    pub fn factory(config: MockConfig) -> PlatformFactory {
        Arc::new(move |_client: &ClientPlatform| {
            *config.created.lock().unwrap() += 1;
            if let Some(err) = &config.construction_error {
                return Err(err.clone().into());
            }
            Ok(Box::new(MockPlatform::from_config(config.clone())) as Box<dyn Platform>)
        })
    }

    pub fn auth_call_count(&self) -> usize {
        self.config.auth_calls()
    }

    pub fn post_call_count(&self) -> usize {
        self.config.post_calls()
    }

    async fn post(&self, kind: MediaKind, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        *self.config.post_calls.lock().unwrap() += 1;

        if !self.config.capabilities.supports(kind) {
            return Err(PlatformError::Posting(format!(
                "{} does not support {} posts",
                self.config.name, kind
            ))
            .into());
        }
        if !self.authenticated {
            return Err(PlatformError::Authentication("Not authenticated".to_string()).into());
        }

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if self.config.panic_on_post {
            panic!("{} mock panicked while posting", self.config.name);
        }

        if let Some(err) = &self.config.post_error {
            return Err(err.clone().into());
        }

        self.config.posted.lock().unwrap().push((
            kind,
            path.to_string(),
            caption.map(str::to_string),
        ));

        let id = format!("{}:mock-{}", self.config.name, uuid::Uuid::new_v4());
        let url = format!("https://{}.example/{}", self.config.name, id);
        Ok(PostReceipt::new(id, Some(url)))
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.config.capabilities
    }

    async fn authenticate(&mut self) -> Result<()> {
        *self.config.auth_calls.lock().unwrap() += 1;

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        match &self.config.auth_error {
            Some(err) => Err(err.clone().into()),
            None => {
                self.authenticated = true;
                Ok(())
            }
        }
    }

    async fn post_photo(&self, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        self.post(MediaKind::Photo, path, caption).await
    }

    async fn post_video(&self, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        self.post(MediaKind::Video, path, caption).await
    }

    async fn post_story(&self, path: &str, caption: Option<&str>) -> Result<PostReceipt> {
        self.post(MediaKind::Story, path, caption).await
    }
}
