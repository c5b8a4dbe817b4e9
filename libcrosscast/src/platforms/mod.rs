//! Platform adapters
//!
//! Every supported network is wrapped behind the [`Adapter`] trait, which
//! turns one publish REST exchange into `Published { id, url }` or a tagged
//! [`PlatformError`]. Adapters never panic across this boundary and never
//! read the process environment; everything they need arrives through
//! [`Config`] at construction time.
//!
//! # Examples
//!
//! ```no_run
//! use libcrosscast::platforms::AdapterRegistry;
//! use libcrosscast::{Config, Integration, Platform};
//! use libcrosscast::types::PublishContent;
//!
//! # async fn example() -> libcrosscast::Result<()> {
//! let registry = AdapterRegistry::from_config(&Config::default_config())?;
//! let twitter = registry.get(Platform::Twitter).expect("twitter adapter");
//!
//! let integration = Integration::new("user-1", Platform::Twitter, "oauth2-token");
//! let published = twitter
//!     .publish(&integration, &PublishContent::text("Hello, everyone"))
//!     .await?;
//! println!("Posted {} at {}", published.id, published.url);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{PlatformError, PlatformResult, Result};
use crate::types::{Integration, Platform, PublishContent, Published};

pub mod facebook;
pub mod http;
pub mod instagram;
pub mod linkedin;
pub mod poll;
pub mod reddit;
pub mod threads;
pub mod twitter;

// Available outside tests so the integration tests and binaries' tests can use it
pub mod mock;

/// Unified interface over one social network's publish API
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Which network this adapter talks to
    fn platform(&self) -> Platform;

    /// Maximum post length in characters, or `None` for no hard limit
    fn character_limit(&self) -> Option<usize>;

    /// Content-only checks
    ///
    /// Needs no integration, so it can run when a post is scheduled as well
    /// as right before sending. The default rejects empty text and text over
    /// [`Adapter::character_limit`].
    fn validate_content(&self, content: &PublishContent) -> PlatformResult<()> {
        validate_text(&content.text, self.character_limit())
    }

    /// Check that the integration carries what this platform needs
    fn check_credentials(&self, integration: &Integration) -> PlatformResult<()>;

    /// Full pre-flight check; no network activity
    fn validate(&self, integration: &Integration, content: &PublishContent) -> PlatformResult<()> {
        self.validate_content(content)?;
        self.check_credentials(integration)
    }

    /// Obtain fresh credentials when the stored ones have expired
    ///
    /// Returns the updated integration, which the caller must persist, or
    /// `None` when nothing changed.
    async fn refresh_credentials(
        &self,
        _integration: &Integration,
        _now: i64,
    ) -> PlatformResult<Option<Integration>> {
        Ok(None)
    }

    /// Publish content, validating it first
    ///
    /// # Errors
    ///
    /// Validation failures return before any request is sent. Transport
    /// and API failures map onto the [`PlatformError`] taxonomy.
    async fn publish(
        &self,
        integration: &Integration,
        content: &PublishContent,
    ) -> PlatformResult<Published>;
}

/// Shared content check: non-blank text within `limit` characters
///
/// Length is measured in Unicode scalar values.
pub fn validate_text(text: &str, limit: Option<usize>) -> PlatformResult<()> {
    if text.trim().is_empty() {
        return Err(PlatformError::Validation(
            "Content cannot be empty".to_string(),
        ));
    }

    if let Some(limit) = limit {
        let actual = text.chars().count();
        if actual > limit {
            return Err(PlatformError::ContentTooLong { limit, actual });
        }
    }

    Ok(())
}

/// Require a non-empty credential field
pub(crate) fn require<'a>(value: Option<&'a str>, what: &str) -> PlatformResult<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(PlatformError::MissingCredentials(format!("{} is not set", what))),
    }
}

/// Adapters keyed by platform
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build all six adapters over one shared HTTP client
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http::build_client(&config.http)?;
        let platforms = &config.platforms;
        let poller = poll::Poller::from_config(&config.polling);

        let mut registry = Self::new();
        registry.register(Arc::new(linkedin::LinkedinAdapter::new(
            client.clone(),
            &platforms.linkedin,
        )));
        registry.register(Arc::new(twitter::TwitterAdapter::new(
            client.clone(),
            &platforms.twitter,
        )));
        registry.register(Arc::new(facebook::FacebookAdapter::new(
            client.clone(),
            &platforms.facebook,
        )));
        registry.register(Arc::new(instagram::InstagramAdapter::new(
            client.clone(),
            &platforms.instagram,
            poller.clone(),
        )));
        registry.register(Arc::new(threads::ThreadsAdapter::new(
            client.clone(),
            &platforms.threads,
            poller,
        )));
        registry.register(Arc::new(reddit::RedditAdapter::new(
            client,
            &platforms.reddit,
            &config.http.user_agent,
        )));
        Ok(registry)
    }

    /// Add or replace the adapter for its platform
    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(&platform).cloned()
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.adapters.keys().copied().collect();
        platforms.sort();
        platforms
    }
}
