//! Core types for Postfan

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{PostfanError, Result};

/// Lifecycle of a queued job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::InProgress,
        JobStatus::Done,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::InProgress => "in_progress",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Done, failed and cancelled jobs never move again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = PostfanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "in_progress" | "in-progress" => Ok(JobStatus::InProgress),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" | "canceled" => Ok(JobStatus::Cancelled),
            other => Err(PostfanError::InvalidInput(format!(
                "unknown job status '{}'",
                other
            ))),
        }
    }
}

/// Kind of content a job carries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    PhotoFeed,
    VideoReel,
    Story,
    WeeklyDigest,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::PhotoFeed => "feed",
            ContentType::VideoReel => "reel",
            ContentType::Story => "story",
            ContentType::WeeklyDigest => "weekly",
        }
    }

    /// Resolve which post operation publishes this content.
    ///
    /// A weekly digest has no dedicated post type: it goes out as a video
    /// when the file looks like one and as a photo otherwise.
    pub fn media_kind(&self, path: &str) -> MediaKind {
        match self {
            ContentType::PhotoFeed => MediaKind::Photo,
            ContentType::VideoReel => MediaKind::Video,
            ContentType::Story => MediaKind::Story,
            ContentType::WeeklyDigest => {
                let ext = file_extension(path);
                if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
                    MediaKind::Video
                } else {
                    MediaKind::Photo
                }
            }
        }
    }
}

const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".m4v", ".webm"];

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = PostfanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "feed" | "photo" | "photo-feed" | "photo_feed" => Ok(ContentType::PhotoFeed),
            "reel" | "reels" | "video" | "video-reel" | "video_reel" => Ok(ContentType::VideoReel),
            "story" | "stories" => Ok(ContentType::Story),
            "weekly" | "weekly-digest" | "weekly_digest" | "digest" => {
                Ok(ContentType::WeeklyDigest)
            }
            "" => Err(PostfanError::InvalidInput("missing content_type".to_string())),
            other => Err(PostfanError::InvalidInput(format!(
                "unknown content_type '{}'",
                other
            ))),
        }
    }
}

/// The post operation a platform is asked to perform
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Story,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Photo => f.write_str("photo"),
            MediaKind::Video => f.write_str("video"),
            MediaKind::Story => f.write_str("story"),
        }
    }
}

/// Lower-cased extension including the leading dot, or an empty string
pub fn file_extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// A unit of content scheduled for publishing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: i64,
    pub client: String,
    pub path: String,
    pub content_type: ContentType,
    pub caption: Option<String>,
    pub eta: i64,
    pub status: JobStatus,
    pub extras: Map<String, Value>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub done_at: Option<i64>,
    pub error: Option<String>,
    pub attempts: i64,
    pub claimed_by: Option<String>,
}

impl Job {
    pub fn media_kind(&self) -> MediaKind {
        self.content_type.media_kind(&self.path)
    }
}

/// Intake request for a new job
///
/// `content_type` is kept as raw text so intake can hand over whatever the
/// caller supplied; it is parsed when the job is enqueued.
#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub client: String,
    pub path: String,
    pub content_type: String,
    pub caption: Option<String>,
    pub eta: Option<i64>,
    pub extras: Map<String, Value>,
}

impl NewJob {
    pub fn new(
        client: impl Into<String>,
        path: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            client: client.into(),
            path: path.into(),
            content_type: content_type.into(),
            ..Default::default()
        }
    }

    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn eta(mut self, eta: i64) -> Self {
        self.eta = Some(eta);
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }
}

/// Outcome of one platform within a job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PlatformPostStatus {
    Pending,
    Posted,
    Failed,
}

impl PlatformPostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformPostStatus::Pending => "pending",
            PlatformPostStatus::Posted => "posted",
            PlatformPostStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PlatformPostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformPostStatus {
    type Err = PostfanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PlatformPostStatus::Pending),
            "posted" => Ok(PlatformPostStatus::Posted),
            "failed" => Ok(PlatformPostStatus::Failed),
            other => Err(PostfanError::InvalidInput(format!(
                "unknown platform post status '{}'",
                other
            ))),
        }
    }
}

/// Ledger row: one per (job, platform)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformPost {
    pub id: i64,
    pub job_id: i64,
    pub platform: String,
    pub external_post_id: Option<String>,
    pub external_url: Option<String>,
    pub status: PlatformPostStatus,
    pub error: Option<String>,
    pub posted_at: Option<i64>,
    pub created_at: i64,
}

/// What a platform hands back after accepting a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostReceipt {
    pub external_post_id: String,
    pub external_url: Option<String>,
    pub timestamp: i64,
}

impl PostReceipt {
    pub fn new(external_post_id: impl Into<String>, external_url: Option<String>) -> Self {
        Self {
            external_post_id: external_post_id.into(),
            external_url,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// A client's configuration for one destination platform
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientPlatform {
    pub client: String,
    pub platform: String,
    pub enabled: bool,
    pub credentials: Map<String, Value>,
    pub settings: Map<String, Value>,
}

impl ClientPlatform {
    pub fn new(client: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            platform: platform.into(),
            enabled: true,
            credentials: Map::new(),
            settings: Map::new(),
        }
    }

    pub fn with_credential(mut self, key: &str, value: &str) -> Self {
        self.credentials
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    pub fn with_setting(mut self, key: &str, value: Value) -> Self {
        self.settings.insert(key.to_string(), value);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Non-empty string credential, if present
    pub fn credential(&self, key: &str) -> Option<&str> {
        self.credentials
            .get(key)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }
}

impl fmt::Debug for ClientPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&String> = self.credentials.keys().collect();
        f.debug_struct("ClientPlatform")
            .field("client", &self.client)
            .field("platform", &self.platform)
            .field("enabled", &self.enabled)
            .field("credentials", &format_args!("<redacted {:?}>", keys))
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_aliases() {
        assert_eq!("feed".parse::<ContentType>().unwrap(), ContentType::PhotoFeed);
        assert_eq!("photo".parse::<ContentType>().unwrap(), ContentType::PhotoFeed);
        assert_eq!("video".parse::<ContentType>().unwrap(), ContentType::VideoReel);
        assert_eq!("Reels".parse::<ContentType>().unwrap(), ContentType::VideoReel);
        assert_eq!("stories".parse::<ContentType>().unwrap(), ContentType::Story);
        assert_eq!("weekly-digest".parse::<ContentType>().unwrap(), ContentType::WeeklyDigest);
    }

    #[test]
    fn test_content_type_rejects_empty_and_unknown() {
        assert!(matches!(
            "".parse::<ContentType>(),
            Err(PostfanError::InvalidInput(_))
        ));
        assert!(matches!(
            "carousel".parse::<ContentType>(),
            Err(PostfanError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_weekly_digest_media_kind_follows_extension() {
        assert_eq!(ContentType::WeeklyDigest.media_kind("recap.MP4"), MediaKind::Video);
        assert_eq!(ContentType::WeeklyDigest.media_kind("recap.png"), MediaKind::Photo);
        assert_eq!(ContentType::Story.media_kind("a.mp4"), MediaKind::Story);
    }

    #[test]
    fn test_job_status_roundtrip_and_terminal() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("dir/Clip.MOV"), ".mov");
        assert_eq!(file_extension("noext"), "");
    }

    #[test]
    fn test_client_platform_debug_redacts_credentials() {
        let cp = ClientPlatform::new("acme", "twitter").with_credential("api_key", "hunter2");
        let debug = format!("{:?}", cp);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("api_key"));
    }

    #[test]
    fn test_client_platform_credential_ignores_empty() {
        let cp = ClientPlatform::new("acme", "twitter").with_credential("api_key", "");
        assert_eq!(cp.credential("api_key"), None);
    }
}
