//! Static per-platform capability table

use serde::Serialize;

use crate::error::{PlatformError, Result};
use crate::types::{file_extension, ContentType, MediaKind};

/// Which post operations a platform supports and the extensions each accepts
///
/// Extensions are lower-case and include the leading dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub supports_photo: bool,
    pub supports_video: bool,
    pub supports_story: bool,
    pub photo_extensions: &'static [&'static str],
    pub video_extensions: &'static [&'static str],
    pub story_extensions: &'static [&'static str],
}

const NONE: &[&str] = &[];

pub const INSTAGRAM: Capabilities = Capabilities {
    supports_photo: true,
    supports_video: true,
    supports_story: true,
    photo_extensions: &[".jpg", ".jpeg", ".png"],
    video_extensions: &[".mp4", ".mov"],
    story_extensions: &[".jpg", ".jpeg", ".png", ".mp4", ".mov"],
};

pub const TWITTER: Capabilities = Capabilities {
    supports_photo: true,
    supports_video: true,
    supports_story: false,
    photo_extensions: &[".jpg", ".jpeg", ".png", ".gif"],
    video_extensions: &[".mp4", ".mov"],
    story_extensions: NONE,
};

pub const LINKEDIN: Capabilities = Capabilities {
    supports_photo: true,
    supports_video: true,
    supports_story: false,
    photo_extensions: &[".jpg", ".jpeg", ".png"],
    video_extensions: &[".mp4", ".mov"],
    story_extensions: NONE,
};

pub const YOUTUBE: Capabilities = Capabilities {
    supports_photo: false,
    supports_video: true,
    supports_story: false,
    photo_extensions: NONE,
    video_extensions: &[".mp4", ".mov", ".avi"],
    story_extensions: NONE,
};

pub const TIKTOK: Capabilities = Capabilities {
    supports_photo: false,
    supports_video: true,
    supports_story: false,
    photo_extensions: NONE,
    video_extensions: &[".mp4", ".mov"],
    story_extensions: NONE,
};

pub const FACEBOOK: Capabilities = Capabilities {
    supports_photo: true,
    supports_video: true,
    supports_story: true,
    photo_extensions: &[".jpg", ".jpeg", ".png", ".gif"],
    video_extensions: &[".mp4", ".mov", ".avi"],
    story_extensions: &[".jpg", ".jpeg", ".png", ".mp4", ".mov"],
};

/// Capabilities of the built-in platforms by name
pub fn capabilities(platform: &str) -> Option<&'static Capabilities> {
    match platform {
        "instagram" => Some(&INSTAGRAM),
        "twitter" => Some(&TWITTER),
        "linkedin" => Some(&LINKEDIN),
        "youtube" => Some(&YOUTUBE),
        "tiktok" => Some(&TIKTOK),
        "facebook" => Some(&FACEBOOK),
        _ => None,
    }
}

impl Capabilities {
    pub fn supports(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Photo => self.supports_photo,
            MediaKind::Video => self.supports_video,
            MediaKind::Story => self.supports_story,
        }
    }

    /// Accepted extensions for `kind`; empty when the kind is unsupported
    pub fn allowed_extensions(&self, kind: MediaKind) -> &'static [&'static str] {
        if !self.supports(kind) {
            return NONE;
        }
        match kind {
            MediaKind::Photo => self.photo_extensions,
            MediaKind::Video => self.video_extensions,
            MediaKind::Story => self.story_extensions,
        }
    }

    /// Check that `path` can be published as `content_type`
    ///
    /// Only the extension is inspected; the file itself is not opened.
    pub fn validate_file(&self, path: &str, content_type: ContentType) -> Result<()> {
        let kind = content_type.media_kind(path);
        if !self.supports(kind) {
            return Err(PlatformError::Validation(format!("{} posts are not supported", kind)).into());
        }

        let ext = file_extension(path);
        let allowed = self.allowed_extensions(kind);
        if !allowed.contains(&ext.as_str()) {
            let shown = if ext.is_empty() { "<none>" } else { ext.as_str() };
            return Err(PlatformError::Validation(format!(
                "unsupported file extension '{}' for {} (allowed: {})",
                shown,
                kind,
                allowed.join(", ")
            ))
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PostfanError;

    #[test]
    fn test_lookup_unknown_platform() {
        assert!(capabilities("myspace").is_none());
        assert_eq!(capabilities("youtube"), Some(&YOUTUBE));
    }

    #[test]
    fn test_video_only_platforms() {
        for caps in [YOUTUBE, TIKTOK] {
            assert!(caps.supports(MediaKind::Video));
            assert!(!caps.supports(MediaKind::Photo));
            assert!(!caps.supports(MediaKind::Story));
            assert!(caps.allowed_extensions(MediaKind::Photo).is_empty());
        }
    }

    #[test]
    fn test_story_support() {
        assert!(INSTAGRAM.supports(MediaKind::Story));
        assert!(FACEBOOK.supports(MediaKind::Story));
        assert!(!TWITTER.supports(MediaKind::Story));
        assert!(!LINKEDIN.supports(MediaKind::Story));
    }

    #[test]
    fn test_validate_extension_case_insensitive() {
        assert!(INSTAGRAM.validate_file("shots/Beach.JPG", ContentType::PhotoFeed).is_ok());
        assert!(YOUTUBE.validate_file("clip.MOV", ContentType::VideoReel).is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_extension() {
        let err = TIKTOK
            .validate_file("clip.avi", ContentType::VideoReel)
            .unwrap_err();
        assert!(matches!(err, PostfanError::Platform(PlatformError::Validation(_))));
        assert!(err.to_string().contains(".avi"));

        assert!(TWITTER.validate_file("notes.txt", ContentType::PhotoFeed).is_err());
        assert!(TWITTER.validate_file("no_extension", ContentType::PhotoFeed).is_err());
    }

    #[test]
    fn test_validate_rejects_unsupported_kind() {
        let err = YOUTUBE
            .validate_file("a.jpg", ContentType::PhotoFeed)
            .unwrap_err();
        assert!(err.to_string().contains("photo posts are not supported"));
    }

    #[test]
    fn test_weekly_digest_resolves_by_extension() {
        assert!(YOUTUBE.validate_file("recap.mp4", ContentType::WeeklyDigest).is_ok());
        assert!(YOUTUBE.validate_file("recap.png", ContentType::WeeklyDigest).is_err());
        assert!(INSTAGRAM.validate_file("recap.png", ContentType::WeeklyDigest).is_ok());
    }
}
