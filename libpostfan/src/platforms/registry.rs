//! Platform registry: name → capabilities + adapter factory

use std::collections::BTreeMap;
use std::sync::Arc;

use super::capabilities::{self, Capabilities};
use super::facebook::FacebookPlatform;
use super::instagram::InstagramPlatform;
use super::linkedin::LinkedInPlatform;
use super::tiktok::TikTokPlatform;
use super::twitter::TwitterPlatform;
use super::youtube::YouTubePlatform;
use super::Platform;
use crate::error::{PostfanError, Result};
use crate::types::ClientPlatform;

/// Builds an adapter from a client's platform configuration
///
/// Construction fails with an authentication error when required
/// credentials are missing.
pub type PlatformFactory =
    Arc<dyn Fn(&ClientPlatform) -> Result<Box<dyn Platform>> + Send + Sync>;

#[derive(Clone)]
struct Entry {
    capabilities: Capabilities,
    factory: PlatformFactory,
}

/// The set of platforms the fan-out can target
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    entries: BTreeMap<String, Entry>,
}

impl PlatformRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in adapter
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_builtin("instagram", |c| {
            Ok(Box::new(InstagramPlatform::new(c)?) as Box<dyn Platform>)
        });
        registry.register_builtin("twitter", |c| {
            Ok(Box::new(TwitterPlatform::new(c)?) as Box<dyn Platform>)
        });
        registry.register_builtin("linkedin", |c| {
            Ok(Box::new(LinkedInPlatform::new(c)?) as Box<dyn Platform>)
        });
        registry.register_builtin("youtube", |c| {
            Ok(Box::new(YouTubePlatform::new(c)?) as Box<dyn Platform>)
        });
        registry.register_builtin("tiktok", |c| {
            Ok(Box::new(TikTokPlatform::new(c)?) as Box<dyn Platform>)
        });
        registry.register_builtin("facebook", |c| {
            Ok(Box::new(FacebookPlatform::new(c)?) as Box<dyn Platform>)
        });
        registry
    }

    fn register_builtin<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ClientPlatform) -> Result<Box<dyn Platform>> + Send + Sync + 'static,
    {
        if let Some(caps) = capabilities::capabilities(name) {
            self.register(name, *caps, Arc::new(factory));
        }
    }

    /// Add or replace a platform
    pub fn register(&mut self, name: &str, capabilities: Capabilities, factory: PlatformFactory) {
        self.entries.insert(
            name.to_lowercase(),
            Entry {
                capabilities,
                factory,
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn capabilities(&self, name: &str) -> Option<&Capabilities> {
        self.entries.get(name).map(|e| &e.capabilities)
    }

    /// Registered platform names in order
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Construct the adapter for `config.platform`
    pub fn create(&self, config: &ClientPlatform) -> Result<Box<dyn Platform>> {
        let entry = self.entries.get(&config.platform).ok_or_else(|| {
            PostfanError::InvalidInput(format!("unknown platform '{}'", config.platform))
        })?;
        (entry.factory)(config)
    }
}
