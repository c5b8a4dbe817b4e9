//! Error types for Crosscast

use thiserror::Error;

use crate::types::FailedTarget;

pub type Result<T> = std::result::Result<T, CrosscastError>;

/// Result type used across the adapter boundary
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

#[derive(Error, Debug)]
pub enum CrosscastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No active integrations for the requested platforms")]
    NoActiveIntegrations,

    #[error("No platform succeeded ({} failed)", .failed.len())]
    NothingPublished {
        /// Id of the `failed` post persisted for audit
        post_id: String,
        failed: Vec<FailedTarget>,
    },
}

impl CrosscastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosscastError::Config(_) | CrosscastError::Database(_) => 2,
            CrosscastError::InvalidInput(_) | CrosscastError::NotFound(_) => 3,
            CrosscastError::Platform(e) if e.is_validation() => 3,
            CrosscastError::Platform(_) => 1,
            CrosscastError::NothingPublished { .. } => 4,
            CrosscastError::NoActiveIntegrations => 5,
        }
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

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Stored value could not be decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Per-platform publish failure
///
/// Adapters return these as values; the orchestrator turns them into
/// `failed` entries and keeps going with the remaining platforms.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Content too long: {actual} characters exceeds the {limit} character limit")]
    ContentTooLong { limit: usize, actual: usize },

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Platform rejected the request{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    PlatformRejected {
        status: Option<u16>,
        message: String,
    },

    #[error("Access token expired: {0}")]
    TokenExpired(String),

    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    #[error("Processing timeout: {0}")]
    ProcessingTimeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl PlatformError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            PlatformError::Validation(_) => "validation_error",
            PlatformError::ContentTooLong { .. } => "content_too_long",
            PlatformError::MissingCredentials(_) => "missing_credentials",
            PlatformError::RateLimited(_) => "rate_limited",
            PlatformError::PlatformRejected { .. } => "platform_rejected",
            PlatformError::TokenExpired(_) => "token_expired",
            PlatformError::NetworkTimeout(_) => "network_timeout",
            PlatformError::ProcessingTimeout(_) => "processing_timeout",
            PlatformError::Network(_) => "network_error",
        }
    }

    /// Whether the failure was caught locally before any network call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PlatformError::Validation(_) | PlatformError::ContentTooLong { .. }
        )
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        PlatformError::PlatformRejected {
            status: Some(status),
            message: message.into(),
        }
    }
}
