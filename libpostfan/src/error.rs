//! Error types for Postfan

use thiserror::Error;

use crate::types::JobStatus;

pub type Result<T> = std::result::Result<T, PostfanError>;

#[derive(Error, Debug)]
pub enum PostfanError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Platform post not found: {0}")]
    PlatformPostNotFound(i64),

    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: i64,
        from: JobStatus,
        to: JobStatus,
    },
}

impl PostfanError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PostfanError::InvalidInput(_) => 3,
            PostfanError::JobNotFound(_) | PostfanError::PlatformPostNotFound(_) => 3,
            PostfanError::Platform(PlatformError::Authentication(_)) => 2,
            PostfanError::Platform(_) => 1,
            PostfanError::InvalidTransition { .. } => 1,
            PostfanError::Config(_) => 1,
            PostfanError::Database(_) => 1,
        }
    }

    /// True for errors raised by the storage layer itself
    pub fn is_storage(&self) -> bool {
        matches!(self, PostfanError::Database(_))
    }
}

impl From<sqlx::Error> for PostfanError {
    fn from(err: sqlx::Error) -> Self {
        PostfanError::Database(DbError::SqlxError(err))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Timed out after {}", timeout_text(.0))]
    Timeout(std::time::Duration),
}

fn timeout_text(limit: &std::time::Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*limit)
}
