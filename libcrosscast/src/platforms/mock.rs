//! Mock adapter for testing
//!
//! A configurable stand-in for any platform that can succeed, fail with a
//! chosen error, stall, or refresh credentials. It counts the publish calls
//! that got past validation, which is where a real adapter would hit the
//! network.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;

use super::{validate_text, Adapter};
use crate::error::{PlatformError, PlatformResult};
use crate::types::{Integration, Platform, PublishContent, Published};

pub struct MockAdapter {
    platform: Platform,
    /// Error returned after validation passes; `None` means success
    failure: Option<PlatformError>,
    character_limit: Option<usize>,
    delay: Duration,
    /// Token lifetime handed out by `refresh_credentials`; `None` disables refresh
    refresh_ttl: Option<i64>,
    network_calls: AtomicUsize,
    published: Mutex<Vec<PublishContent>>,
}

impl MockAdapter {
    fn build(platform: Platform) -> Self {
        Self {
            platform,
            failure: None,
            character_limit: None,
            delay: Duration::ZERO,
            refresh_ttl: None,
            network_calls: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
        }
    }

    /// A mock that always publishes
    pub fn success(platform: Platform) -> Self {
        Self::build(platform)
    }

    /// A mock whose publish fails with `error` after validation
    pub fn failure(platform: Platform, error: PlatformError) -> Self {
        Self {
            failure: Some(error),
            ..Self::build(platform)
        }
    }

    pub fn with_limit(platform: Platform, limit: usize) -> Self {
        Self {
            character_limit: Some(limit),
            ..Self::build(platform)
        }
    }

    /// A mock that takes `delay` to answer
    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::build(platform)
        }
    }

    /// A mock that refreshes expired integrations to a new token
    pub fn refreshing(platform: Platform, ttl: i64) -> Self {
        Self {
            refresh_ttl: Some(ttl),
            ..Self::build(platform)
        }
    }

    /// Publish calls that passed validation
    pub fn network_calls(&self) -> usize {
        self.network_calls.load(Ordering::SeqCst)
    }

    /// Content of every successful publish, in order
    pub fn published(&self) -> Vec<PublishContent> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn character_limit(&self) -> Option<usize> {
        self.character_limit
    }

    fn validate_content(&self, content: &PublishContent) -> PlatformResult<()> {
        validate_text(&content.text, self.character_limit)
    }

    fn check_credentials(&self, integration: &Integration) -> PlatformResult<()> {
        if integration.access_token.trim().is_empty() {
            return Err(PlatformError::MissingCredentials(format!(
                "{} access token is not set",
                self.platform
            )));
        }
        Ok(())
    }

    async fn refresh_credentials(
        &self,
        integration: &Integration,
        now: i64,
    ) -> PlatformResult<Option<Integration>> {
        match self.refresh_ttl {
            Some(ttl) if integration.is_expired(now) => {
                let mut refreshed = integration.clone();
                refreshed.access_token = format!("{}-refreshed", integration.access_token);
                refreshed.expires_at = Some(now + ttl);
                refreshed.updated_at = now;
                Ok(Some(refreshed))
            }
            _ => Ok(None),
        }
    }

    async fn publish(
        &self,
        integration: &Integration,
        content: &PublishContent,
    ) -> PlatformResult<Published> {
        self.validate(integration, content)?;

        let call = self.network_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        if let Ok(mut published) = self.published.lock() {
            published.push(content.clone());
        }

        let id = format!("{}-{}", self.platform, call);
        Ok(Published {
            url: format!("https://mock.example/{}/{}", self.platform, id),
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_counts_calls() {
        let mock = MockAdapter::success(Platform::Twitter);
        let integration = Integration::new("u", Platform::Twitter, "t");

        let first = mock.publish(&integration, &PublishContent::text("one")).await.unwrap();
        let second = mock.publish(&integration, &PublishContent::text("two")).await.unwrap();

        assert_eq!(first.id, "twitter-1");
        assert_eq!(second.url, "https://mock.example/twitter/twitter-2");
        assert_eq!(mock.network_calls(), 2);
        assert_eq!(mock.published().len(), 2);
    }

    #[tokio::test]
    async fn test_validation_failure_makes_no_call() {
        let mock = MockAdapter::with_limit(Platform::Twitter, 5);
        let integration = Integration::new("u", Platform::Twitter, "t");

        let result = mock.publish(&integration, &PublishContent::text("too long")).await;
        assert_eq!(result.unwrap_err().code(), "content_too_long");

        let result = mock.publish(&integration, &PublishContent::text("  ")).await;
        assert_eq!(result.unwrap_err().code(), "validation_error");
        assert_eq!(mock.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_returns_configured_error() {
        let mock = MockAdapter::failure(Platform::Reddit, PlatformError::rejected(500, "down"));
        let integration = Integration::new("u", Platform::Reddit, "t");

        let result = mock.publish(&integration, &PublishContent::text("hi")).await;
        assert_eq!(result, Err(PlatformError::rejected(500, "down")));
        assert_eq!(mock.network_calls(), 1);
        assert!(mock.published().is_empty());
    }

    #[tokio::test]
    async fn test_refreshing_only_when_expired() {
        let mock = MockAdapter::refreshing(Platform::Reddit, 3600);
        let mut integration = Integration::new("u", Platform::Reddit, "old");
        integration.expires_at = Some(100);

        assert_eq!(mock.refresh_credentials(&integration, 50).await, Ok(None));

        let refreshed = mock.refresh_credentials(&integration, 100).await.unwrap().unwrap();
        assert_eq!(refreshed.access_token, "old-refreshed");
        assert_eq!(refreshed.expires_at, Some(3700));
    }
}
