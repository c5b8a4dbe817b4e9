//! Crosscast - publish one piece of content to many social networks
//!
//! This library provides the publishing core: per-platform adapters, the
//! integration and post stores, the daily rate limiter, the immediate
//! publish orchestrator and the scheduled publish loop.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod publisher;
pub mod rate_limiter;
pub mod scheduler;
pub mod scheduling;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, PostWithRecords};
pub use error::{CrosscastError, PlatformError, Result};
pub use publisher::{PublishReport, PublishRequest, Publisher};
pub use scheduler::ScheduledPublisher;
pub use types::{Integration, Platform, Post, PostRecord, PostStatus, Visibility};
