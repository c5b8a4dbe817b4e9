//! Scheduled publish loop
//!
//! Each tick picks up due scheduled posts, claims them so that no other
//! instance processes them too, fans them out through the same pipeline as
//! an immediate publish and moves them to `published` or `failed`. Failed
//! posts are not retried automatically.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::db::ScheduledOutcome;
use crate::error::{PlatformError, Result};
use crate::publisher::{summarize, DispatchOutcome, Publisher};
use crate::service::events::Event;
use crate::types::{FailedTarget, Integration, Post, PostStatus, PublishContent};

/// Rate limit counters older than this many days are deleted
const COUNTER_RETENTION_DAYS: i64 = 2;

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Stale claims released before fetching
    pub released: u64,
    pub due: usize,
    /// Posts this instance lost to another claimant
    pub skipped: usize,
    pub published: usize,
    pub failed: usize,
    /// Posts whose claim or finalize hit a store error; their claim is left
    /// to expire
    pub errored: usize,
}

pub struct ScheduledPublisher {
    publisher: Publisher,
    instance_id: String,
    batch_size: u32,
    claim_timeout_secs: i64,
}

impl ScheduledPublisher {
    pub fn new(publisher: Publisher, config: &SchedulerConfig) -> Self {
        Self {
            publisher,
            instance_id: format!("cast-send-{}", Uuid::new_v4()),
            batch_size: config.batch_size,
            claim_timeout_secs: config.claim_timeout_secs,
        }
    }

    /// Identity written into `claimed_by`
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Process the posts that are due at `now`
    pub async fn tick(&self, now: i64) -> Result<TickSummary> {
        let db = self.publisher.db();
        let mut summary = TickSummary {
            released: db.release_stale_claims(now - self.claim_timeout_secs).await?,
            ..Default::default()
        };
        if summary.released > 0 {
            warn!(released = summary.released, "Released stale scheduled post claims");
        }

        let due = db.due_scheduled_posts(now, self.batch_size).await?;
        summary.due = due.len();
        if due.is_empty() {
            return Ok(summary);
        }
        info!(count = due.len(), "Found scheduled post(s) due for publishing");

        for post in &due {
            match self.process(post, now).await {
                Ok(Some(PostStatus::Published)) => summary.published += 1,
                Ok(Some(_)) => summary.failed += 1,
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    error!(post_id = %post.id, error = %e, "Failed to process scheduled post");
                    summary.errored += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Claim, publish and finalize one post
    ///
    /// Returns the terminal status, or `None` when another instance got there
    /// first. `tick_started` only bounds the clock: the claim, credential
    /// expiry and quota day all use the time this post's processing begins,
    /// since earlier posts in the batch may have taken minutes.
    async fn process(&self, post: &Post, tick_started: i64) -> Result<Option<PostStatus>> {
        let db = self.publisher.db();
        let now = Utc::now().timestamp().max(tick_started);

        if !db
            .claim_scheduled_post(&post.id, &self.instance_id, now)
            .await?
        {
            debug!(post_id = %post.id, "Scheduled post claimed elsewhere, skipping");
            return Ok(None);
        }

        let (targets, missing) = self.resolve_targets(post).await?;
        let content = PublishContent {
            text: post.content.clone(),
            visibility: post.visibility,
            media_url: post.media_url.clone(),
        };

        let mut outcome = if targets.is_empty() {
            DispatchOutcome::default()
        } else {
            self.publisher
                .dispatch(&post.id, &targets, &content, now)
                .await
        };
        outcome.failed.extend(missing);

        let finished_at = Utc::now().timestamp().max(now);
        let terminal = if outcome.succeeded.is_empty() {
            ScheduledOutcome {
                status: PostStatus::Failed,
                platforms: post.platforms.clone(),
                published_at: None,
                error: summarize(&outcome.failed)
                    .or_else(|| Some("no active integrations".to_string())),
            }
        } else {
            ScheduledOutcome {
                status: PostStatus::Published,
                platforms: outcome.succeeded_platforms(),
                published_at: Some(finished_at),
                error: summarize(&outcome.failed),
            }
        };

        let records = outcome.records(&post.id, finished_at);
        if !db
            .finalize_scheduled_post(&post.id, &self.instance_id, &terminal, &records)
            .await?
        {
            warn!(post_id = %post.id, "Scheduled post changed while publishing; result not stored");
            return Ok(None);
        }

        info!(
            post_id = %post.id,
            status = %terminal.status,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Finalized scheduled post"
        );
        self.publisher.emit(Event::ScheduledPostFinalized {
            post_id: post.id.clone(),
            status: terminal.status,
        });

        Ok(Some(terminal.status))
    }

    /// Stored platform list, or every active integration when it is empty
    async fn resolve_targets(&self, post: &Post) -> Result<(Vec<Integration>, Vec<FailedTarget>)> {
        let active = self.publisher.db().active_integrations(&post.user_id).await?;
        if post.platforms.is_empty() {
            return Ok((active, Vec::new()));
        }

        let missing = post
            .platforms
            .iter()
            .filter(|p| !active.iter().any(|i| i.platform == **p))
            .map(|p| {
                FailedTarget::new(
                    *p,
                    &PlatformError::MissingCredentials(format!("no active {} integration", p)),
                )
            })
            .collect();
        let targets = active
            .into_iter()
            .filter(|i| post.platforms.contains(&i.platform))
            .collect();

        Ok((targets, missing))
    }

    /// Delete old quota counters and expired page selections
    pub async fn housekeeping(&self, now: i64) -> Result<()> {
        let db = self.publisher.db();
        let counters = self
            .publisher
            .limiter()
            .cleanup_before(db, now - COUNTER_RETENTION_DAYS * 86_400)
            .await?;
        let selections = db.purge_expired_selections(now).await?;
        if counters > 0 || selections > 0 {
            debug!(counters, selections, "Housekeeping removed stale rows");
        }
        Ok(())
    }

    /// Tick every `interval` until `shutdown` is set
    ///
    /// Tick errors are logged and the loop carries on. Shutdown is checked
    /// every second while waiting.
    pub async fn run(&self, interval: Duration, shutdown: Arc<AtomicBool>) {
        info!(
            instance = %self.instance_id,
            interval_secs = interval.as_secs(),
            "Scheduled publish loop starting"
        );

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping scheduled publish loop");
                break;
            }

            let now = Utc::now().timestamp();
            match self.tick(now).await {
                Ok(summary) if summary.due > 0 => info!(?summary, "Tick complete"),
                Ok(_) => debug!("No scheduled posts due"),
                Err(e) => error!(error = %e, "Error processing scheduled posts"),
            }
            if let Err(e) = self.housekeeping(now).await {
                warn!(error = %e, "Housekeeping failed");
            }

            let mut waited = Duration::ZERO;
            while waited < interval {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                let step = (interval - waited).min(Duration::from_secs(1));
                sleep(step).await;
                waited += step;
            }
        }
    }
}
