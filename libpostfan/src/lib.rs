//! Postfan - scheduled multi-platform media publishing
//!
//! This library provides the job queue, the per-platform post ledger, the
//! platform adapters and the runner that fans each due job out to every
//! platform its client has enabled.

pub mod config;
pub mod db;
pub mod error;
pub mod fanout;
pub mod logging;
pub mod platforms;
pub mod runner;
pub mod scheduling;
pub mod types;

// Re-export commonly used types
pub use config::{Config, SchedulerConfig};
pub use db::{ClientConfigProvider, Database};
pub use error::{PlatformError, PostfanError, Result};
pub use fanout::{AuthSession, FanOutManager, FanOutReport, PostResult};
pub use platforms::{Platform, PlatformRegistry};
pub use runner::{Runner, TickSummary};
pub use types::{
    ClientPlatform, ContentType, Job, JobStatus, MediaKind, NewJob, PlatformPost,
    PlatformPostStatus, PostReceipt,
};
