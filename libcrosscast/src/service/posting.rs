//! Posting service
//!
//! Everything the composer can do with a post: publish it now, schedule it,
//! keep it as a draft, list, inspect and delete it.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{Database, PostWithRecords};
use crate::error::{CrosscastError, Result};
use crate::publisher::{PublishReport, PublishRequest, Publisher};
use crate::scheduling::ensure_future;
use crate::types::{Platform, Post, PostStatus};

#[derive(Clone)]
pub struct PostingService {
    db: Arc<Database>,
    publisher: Publisher,
}

impl PostingService {
    pub fn new(db: Arc<Database>, publisher: Publisher) -> Self {
        Self { db, publisher }
    }

    /// Publish now to the requested platforms
    pub async fn publish(&self, user_id: &str, request: &PublishRequest) -> Result<PublishReport> {
        self.publisher.publish_now(user_id, request).await
    }

    /// Store the request as a draft without sending anything
    pub async fn save_draft(&self, user_id: &str, request: &PublishRequest) -> Result<Post> {
        if request.text.trim().is_empty() {
            return Err(CrosscastError::InvalidInput(
                "Content cannot be empty".to_string(),
            ));
        }

        let post = self.new_post(user_id, request, PostStatus::Draft);
        self.db.create_post(&post).await?;
        tracing::debug!(post_id = %post.id, "Saved draft");
        Ok(post)
    }

    /// Store the request for the scheduler to publish at `at`
    ///
    /// Content is checked now against every target platform's rules so a
    /// post that can never go out is refused up front. With no platforms
    /// listed, the targets are the user's active integrations at send time;
    /// they are checked against the currently active ones.
    pub async fn schedule(
        &self,
        user_id: &str,
        request: &PublishRequest,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Post> {
        ensure_future(at, now)?;

        let targets: Vec<Platform> = if request.platforms.is_empty() {
            self.db
                .active_integrations(user_id)
                .await?
                .into_iter()
                .map(|i| i.platform)
                .collect()
        } else {
            request.platforms.clone()
        };
        if targets.is_empty() {
            return Err(CrosscastError::NoActiveIntegrations);
        }

        let content = request.content();
        for platform in &targets {
            let adapter = self.publisher.registry().get(*platform).ok_or_else(|| {
                CrosscastError::InvalidInput(format!("{} is not supported", platform))
            })?;
            adapter.validate_content(&content).map_err(|e| {
                CrosscastError::InvalidInput(format!("{}: {}", platform, e))
            })?;
        }

        let mut post = self.new_post(user_id, request, PostStatus::Scheduled);
        post.scheduled_at = Some(at.timestamp());
        self.db.create_post(&post).await?;

        tracing::info!(post_id = %post.id, scheduled_at = %at.to_rfc3339(), "Scheduled post");
        Ok(post)
    }

    /// Delete a draft or scheduled post
    ///
    /// Published and failed posts are history and cannot be deleted.
    pub async fn delete(&self, user_id: &str, post_id: &str) -> Result<()> {
        if self.db.delete_editable_post(user_id, post_id).await? {
            tracing::debug!(post_id, "Deleted post");
            return Ok(());
        }

        match self.db.get_post(post_id).await? {
            Some(post) if post.user_id == user_id => Err(CrosscastError::InvalidInput(format!(
                "Post {} is {}; only drafts and scheduled posts can be deleted",
                post_id,
                if post.status.is_terminal() {
                    post.status.as_str()
                } else {
                    "being published"
                }
            ))),
            _ => Err(CrosscastError::NotFound(format!("post {}", post_id))),
        }
    }

    /// A user's posts, newest first
    pub async fn list(
        &self,
        user_id: &str,
        status: Option<PostStatus>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        self.db.list_posts(user_id, status, limit).await
    }

    /// One post with its per-platform records
    pub async fn get(&self, user_id: &str, post_id: &str) -> Result<PostWithRecords> {
        match self.db.get_post_with_records(post_id).await? {
            Some(found) if found.post.user_id == user_id => Ok(found),
            _ => Err(CrosscastError::NotFound(format!("post {}", post_id))),
        }
    }

    fn new_post(&self, user_id: &str, request: &PublishRequest, status: PostStatus) -> Post {
        let mut post = Post::new(user_id, request.text.clone(), status);
        post.visibility = request.visibility;
        post.media_url = request.media_url.clone();
        post.platforms = request.platforms.clone();
        post
    }
}
