//! Immediate publish orchestration
//!
//! Fans one piece of content out to every targeted integration at once.
//! Each platform runs its own pipeline (validate, quota reservation,
//! credential refresh, publish) and its outcome never affects the others.
//! The results are aggregated into one post plus a record per attempt.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::{CrosscastError, PlatformError, Result};
use crate::platforms::{Adapter, AdapterRegistry};
use crate::rate_limiter::DailyRateLimiter;
use crate::service::events::{Event, EventBus};
use crate::types::{
    FailedTarget, Integration, Platform, Post, PostRecord, PostStatus, PublishContent,
    PublishedTarget, Visibility,
};

/// Failure code for a platform whose pipeline hit a store error
pub const STORE_ERROR_CODE: &str = "store_error";

/// Composer payload for an immediate publish
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub text: String,
    pub visibility: Visibility,
    /// Platforms to target; empty means every active integration
    pub platforms: Vec<Platform>,
    pub media_url: Option<String>,
}

impl PublishRequest {
    pub fn content(&self) -> PublishContent {
        PublishContent {
            text: self.text.clone(),
            visibility: self.visibility,
            media_url: self.media_url.clone(),
        }
    }
}

/// Aggregated outcome of a publish with at least one success
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub post_id: String,
    pub succeeded: Vec<PublishedTarget>,
    pub failed: Vec<FailedTarget>,
}

/// Per-platform results of one fan-out
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub succeeded: Vec<PublishedTarget>,
    pub failed: Vec<FailedTarget>,
}

impl DispatchOutcome {
    pub fn records(&self, post_id: &str, attempted_at: i64) -> Vec<PostRecord> {
        self.succeeded
            .iter()
            .map(|s| PostRecord::succeeded(post_id, s, attempted_at))
            .chain(
                self.failed
                    .iter()
                    .map(|f| PostRecord::failed(post_id, f, attempted_at)),
            )
            .collect()
    }

    pub fn succeeded_platforms(&self) -> Vec<Platform> {
        self.succeeded.iter().map(|s| s.platform).collect()
    }

    /// One line naming each failed platform and why
    pub fn error_summary(&self) -> Option<String> {
        summarize(&self.failed)
    }
}

pub(crate) fn summarize(failed: &[FailedTarget]) -> Option<String> {
    if failed.is_empty() {
        return None;
    }
    Some(
        failed
            .iter()
            .map(|f| format!("{}: {}", f.platform, f.message))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

#[derive(Clone)]
pub struct Publisher {
    db: Arc<Database>,
    registry: Arc<AdapterRegistry>,
    limiter: Arc<DailyRateLimiter>,
    publish_timeout: Duration,
    events: Option<EventBus>,
}

impl Publisher {
    pub fn new(
        db: Arc<Database>,
        registry: Arc<AdapterRegistry>,
        limiter: DailyRateLimiter,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            db,
            registry,
            limiter: Arc::new(limiter),
            publish_timeout,
            events: None,
        }
    }

    pub fn from_config(db: Arc<Database>, registry: Arc<AdapterRegistry>, config: &Config) -> Self {
        Self::new(
            db,
            registry,
            DailyRateLimiter::new(config.rate_limits.clone()),
            config.http.publish_timeout(),
        )
    }

    /// Emit progress events on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn limiter(&self) -> &DailyRateLimiter {
        &self.limiter
    }

    pub(crate) fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    /// Publish to the requested platforms now
    ///
    /// # Errors
    ///
    /// - `NoActiveIntegrations` when none of the targets has an active
    ///   integration; nothing is sent and nothing is stored.
    /// - `NothingPublished` when every platform failed; a `failed` post is
    ///   stored for audit and its id is carried in the error.
    /// - Store errors outside the per-platform pipelines propagate as they
    ///   are.
    pub async fn publish_now(&self, user_id: &str, request: &PublishRequest) -> Result<PublishReport> {
        let now = Utc::now().timestamp();
        let active = self.db.active_integrations(user_id).await?;

        let mut missing = Vec::new();
        let targets: Vec<Integration> = if request.platforms.is_empty() {
            active
        } else {
            for platform in &request.platforms {
                if !active.iter().any(|i| i.platform == *platform) {
                    missing.push(FailedTarget::new(
                        *platform,
                        &PlatformError::MissingCredentials(format!(
                            "no active {} integration",
                            platform
                        )),
                    ));
                }
            }
            active
                .into_iter()
                .filter(|i| request.platforms.contains(&i.platform))
                .collect()
        };

        if targets.is_empty() {
            debug!(user_id, "No active integrations for publish request");
            return Err(CrosscastError::NoActiveIntegrations);
        }

        let mut post = Post::new(user_id, request.text.clone(), PostStatus::Published);
        post.visibility = request.visibility;
        post.media_url = request.media_url.clone();

        let mut outcome = self
            .dispatch(&post.id, &targets, &request.content(), now)
            .await;
        outcome.failed.extend(missing);

        let records = outcome.records(&post.id, now);

        if outcome.succeeded.is_empty() {
            post.status = PostStatus::Failed;
            post.platforms = if request.platforms.is_empty() {
                targets.iter().map(|i| i.platform).collect()
            } else {
                request.platforms.clone()
            };
            post.error = outcome.error_summary();
            self.db.create_post_with_records(&post, &records).await?;

            warn!(post_id = %post.id, failed = outcome.failed.len(), "Publish failed on every platform");
            return Err(CrosscastError::NothingPublished {
                post_id: post.id,
                failed: outcome.failed,
            });
        }

        post.platforms = outcome.succeeded_platforms();
        post.published_at = Some(now);
        self.db.create_post_with_records(&post, &records).await?;

        info!(
            post_id = %post.id,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Published post"
        );

        Ok(PublishReport {
            post_id: post.id,
            succeeded: outcome.succeeded,
            failed: outcome.failed,
        })
    }

    /// Run every integration's publish pipeline concurrently
    ///
    /// Shared by the immediate path and the scheduler. Every attempt ends as
    /// a success or a [`FailedTarget`]; a store error inside one platform's
    /// pipeline fails that platform with `store_error` and leaves the others'
    /// results intact.
    pub async fn dispatch(
        &self,
        post_id: &str,
        integrations: &[Integration],
        content: &PublishContent,
        now: i64,
    ) -> DispatchOutcome {
        self.emit(Event::PublishStarted {
            post_id: post_id.to_string(),
            platforms: integrations.iter().map(|i| i.platform).collect(),
        });

        let attempts = integrations
            .iter()
            .map(|integration| self.publish_one(post_id, integration, content, now));
        let results = join_all(attempts).await;

        let mut outcome = DispatchOutcome::default();
        for result in results {
            match result {
                Ok(published) => outcome.succeeded.push(published),
                Err(failed) => outcome.failed.push(failed),
            }
        }

        self.emit(Event::PublishCompleted {
            post_id: post_id.to_string(),
            succeeded: outcome.succeeded.len(),
            failed: outcome.failed.len(),
        });

        outcome
    }

    /// One platform's pipeline, reduced to its outcome
    async fn publish_one(
        &self,
        post_id: &str,
        integration: &Integration,
        content: &PublishContent,
        now: i64,
    ) -> std::result::Result<PublishedTarget, FailedTarget> {
        let platform = integration.platform;
        let outcome = match self.attempt(integration, content, now).await {
            Ok(Ok(published)) => Ok(published),
            Ok(Err(error)) => {
                debug!(%platform, code = error.code(), %error, "Platform attempt failed");
                Err(FailedTarget::new(platform, &error))
            }
            Err(e) => {
                error!(%platform, error = %e, "Store error during platform attempt");
                Err(FailedTarget {
                    platform,
                    code: STORE_ERROR_CODE.to_string(),
                    message: e.to_string(),
                })
            }
        };

        match &outcome {
            Ok(published) => self.emit(Event::PlatformSucceeded {
                post_id: post_id.to_string(),
                platform,
                platform_post_id: published.id.clone(),
                url: published.url.clone(),
            }),
            Err(failed) => self.emit(Event::PlatformFailed {
                post_id: post_id.to_string(),
                platform,
                code: failed.code.clone(),
                message: failed.message.clone(),
            }),
        }

        outcome
    }

    async fn attempt(
        &self,
        integration: &Integration,
        content: &PublishContent,
        now: i64,
    ) -> Result<std::result::Result<PublishedTarget, PlatformError>> {
        let platform = integration.platform;
        let adapter = match self.registry.get(platform) {
            Some(adapter) => adapter,
            None => {
                return Ok(Err(PlatformError::Validation(format!(
                    "{} is not supported",
                    platform
                ))))
            }
        };

        if let Err(e) = adapter.validate(integration, content) {
            return Ok(Err(e));
        }

        if !self
            .limiter
            .try_reserve(&self.db, platform, &integration.user_id, now)
            .await?
        {
            return Ok(Err(PlatformError::RateLimited(format!(
                "daily {} quota reached",
                platform
            ))));
        }

        let result = self.send(adapter.as_ref(), integration, content, now).await;
        if !matches!(result, Ok(Ok(_))) {
            self.limiter
                .release(&self.db, platform, &integration.user_id, now)
                .await;
        }
        result
    }

    /// Refresh credentials if needed, then publish within the timeout
    async fn send(
        &self,
        adapter: &dyn Adapter,
        integration: &Integration,
        content: &PublishContent,
        now: i64,
    ) -> Result<std::result::Result<PublishedTarget, PlatformError>> {
        let platform = integration.platform;
        let integration = match adapter.refresh_credentials(integration, now).await {
            Ok(Some(refreshed)) => {
                self.db.update_integration_tokens(&refreshed, now).await?;
                refreshed
            }
            Ok(None) => integration.clone(),
            Err(e) => return Ok(Err(e)),
        };

        let published = match tokio::time::timeout(
            self.publish_timeout,
            adapter.publish(&integration, content),
        )
        .await
        {
            Ok(Ok(published)) => published,
            Ok(Err(e)) => return Ok(Err(e)),
            Err(_) => {
                return Ok(Err(PlatformError::NetworkTimeout(format!(
                    "{} did not finish within {}s",
                    platform,
                    self.publish_timeout.as_secs()
                ))))
            }
        };

        if let Err(e) = self.db.touch_integration(&integration.id, now).await {
            warn!(%platform, error = %e, "Failed to update integration last_used_at");
        }

        Ok(Ok(PublishedTarget {
            platform,
            id: published.id,
            url: published.url,
        }))
    }
}
