//! Platform adapters
//!
//! Every destination implements [`Platform`]: authenticate once, then publish
//! a photo, a video or a story from a local file. Which operations a platform
//! offers and which file extensions it takes is static data in
//! [`capabilities`], so callers can filter without constructing an adapter.
//!
//! ```no_run
//! use libpostfan::platforms::{Platform, PlatformRegistry};
//! use libpostfan::types::ClientPlatform;
//!
//! # async fn example() -> libpostfan::error::Result<()> {
//! let registry = PlatformRegistry::with_defaults();
//! let config = ClientPlatform::new("acme", "facebook")
//!     .with_credential("FACEBOOK_ACCESS_TOKEN", "token")
//!     .with_credential("FACEBOOK_PAGE_ID", "1234");
//!
//! let mut platform = registry.create(&config)?;
//! platform.authenticate().await?;
//! let receipt = platform.post_photo("media/launch.jpg", Some("We are live")).await?;
//! println!("{}", receipt.external_post_id);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::{PlatformError, Result};
use crate::types::{ContentType, MediaKind, PostReceipt};

pub mod capabilities;
pub mod facebook;
pub mod http;
pub mod instagram;
pub mod linkedin;
pub mod registry;
pub mod tiktok;
pub mod twitter;
pub mod youtube;

// Compiled into every build so integration tests in other crates can use it
pub mod mock;

pub use capabilities::{capabilities, Capabilities};
pub use registry::{PlatformFactory, PlatformRegistry};

/// Unified interface to one destination platform
///
/// `authenticate` takes `&mut self` and runs before any post. The post
/// operations take `&self` so one authenticated adapter can be shared across
/// concurrent jobs in a tick.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Lower-case identifier, e.g. "instagram"
    fn name(&self) -> &str;

    fn capabilities(&self) -> &Capabilities;

    /// Establish a session with the platform
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` when the platform rejects the
    /// credentials, `PlatformError::Network` when it cannot be reached.
    async fn authenticate(&mut self) -> Result<()>;

    async fn post_photo(&self, _path: &str, _caption: Option<&str>) -> Result<PostReceipt> {
        Err(unsupported(self.name(), MediaKind::Photo))
    }

    async fn post_video(&self, _path: &str, _caption: Option<&str>) -> Result<PostReceipt> {
        Err(unsupported(self.name(), MediaKind::Video))
    }

    async fn post_story(&self, _path: &str, _caption: Option<&str>) -> Result<PostReceipt> {
        Err(unsupported(self.name(), MediaKind::Story))
    }

    /// Check the file's extension against this platform's capability table
    fn validate_file(&self, path: &str, content_type: ContentType) -> Result<()> {
        self.capabilities().validate_file(path, content_type)
    }

    /// Dispatch to the post operation for `kind`
    async fn publish(
        &self,
        kind: MediaKind,
        path: &str,
        caption: Option<&str>,
    ) -> Result<PostReceipt> {
        match kind {
            MediaKind::Photo => self.post_photo(path, caption).await,
            MediaKind::Video => self.post_video(path, caption).await,
            MediaKind::Story => self.post_story(path, caption).await,
        }
    }
}

fn unsupported(platform: &str, kind: MediaKind) -> crate::error::PostfanError {
    PlatformError::Posting(format!("{} does not support {} posts", platform, kind)).into()
}

/// Extension check used at the top of each adapter's post operation
pub(crate) fn ensure_extension(caps: &Capabilities, kind: MediaKind, path: &str) -> Result<()> {
    let content_type = match kind {
        MediaKind::Photo => ContentType::PhotoFeed,
        MediaKind::Video => ContentType::VideoReel,
        MediaKind::Story => ContentType::Story,
    };
    caps.validate_file(path, content_type)
}
