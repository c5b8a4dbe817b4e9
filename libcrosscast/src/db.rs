//! Database operations for Crosscast
//!
//! SQLite stands in for the document store: integrations, posts with their
//! per-platform records, daily rate-limit counters and pending OAuth
//! selections. Every cross-path mutation is a single conditional statement,
//! so the immediate and scheduled publish paths never race on read-then-write.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DbError, Result};
use crate::types::{
    FailedTarget, Integration, PendingSelection, Platform, Post, PostRecord, PostStatus,
};

/// A post with all its platform records
#[derive(Debug, Clone)]
pub struct PostWithRecords {
    pub post: Post,
    pub records: Vec<PostRecord>,
}

impl PostWithRecords {
    /// Platform post id per succeeded platform
    pub fn result_ids(&self) -> BTreeMap<Platform, String> {
        self.records
            .iter()
            .filter(|r| r.success)
            .filter_map(|r| r.platform_post_id.clone().map(|id| (r.platform, id)))
            .collect()
    }

    /// Public url per succeeded platform
    pub fn result_urls(&self) -> BTreeMap<Platform, String> {
        self.records
            .iter()
            .filter(|r| r.success)
            .filter_map(|r| r.url.clone().map(|url| (r.platform, url)))
            .collect()
    }

    /// Non-fatal errors recorded for the platforms that failed
    pub fn errors(&self) -> Vec<FailedTarget> {
        self.records
            .iter()
            .filter(|r| !r.success)
            .map(|r| FailedTarget {
                platform: r.platform,
                code: r.error_code.clone().unwrap_or_default(),
                message: r.error_message.clone().unwrap_or_default(),
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

fn decode_err(message: String) -> DbError {
    DbError::SqlxError(sqlx::Error::Decode(message.into()))
}

fn integration_from_row(row: &SqliteRow) -> Result<Integration> {
    let platform: String = row.get("platform");
    Ok(Integration {
        id: row.get("id"),
        user_id: row.get("user_id"),
        platform: platform.parse().map_err(decode_err)?,
        external_id: row.get("external_id"),
        username: row.get("username"),
        access_token: row.get("access_token"),
        secondary_token: row.get("secondary_token"),
        expires_at: row.get("expires_at"),
        page_id: row.get("page_id"),
        page_token: row.get("page_token"),
        subreddit: row.get("subreddit"),
        active: row.get::<i64, _>("active") != 0,
        last_used_at: row.get("last_used_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn post_from_row(row: &SqliteRow) -> Result<Post> {
    let visibility: String = row.get("visibility");
    let status: String = row.get("status");
    let platforms: String = row.get("platforms");
    Ok(Post {
        id: row.get("id"),
        user_id: row.get("user_id"),
        content: row.get("content"),
        visibility: visibility.parse().map_err(decode_err)?,
        status: status.parse().map_err(decode_err)?,
        media_url: row.get("media_url"),
        platforms: serde_json::from_str(&platforms).map_err(DbError::Serialization)?,
        scheduled_at: row.get("scheduled_at"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        error: row.get("error"),
    })
}

fn record_from_row(row: &SqliteRow) -> Result<PostRecord> {
    let platform: String = row.get("platform");
    Ok(PostRecord {
        id: row.get("id"),
        post_id: row.get("post_id"),
        platform: platform.parse().map_err(decode_err)?,
        platform_post_id: row.get("platform_post_id"),
        url: row.get("url"),
        success: row.get::<i64, _>("success") != 0,
        error_code: row.get("error_code"),
        error_message: row.get("error_message"),
        attempted_at: row.get("attempted_at"),
    })
}

fn selection_from_row(row: &SqliteRow) -> Result<PendingSelection> {
    let platform: String = row.get("platform");
    let options: String = row.get("options");
    Ok(PendingSelection {
        id: row.get("id"),
        user_id: row.get("user_id"),
        platform: platform.parse().map_err(decode_err)?,
        user_token: row.get("user_token"),
        options: serde_json::from_str(&options).map_err(DbError::Serialization)?,
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    })
}

const POST_COLUMNS: &str = "id, user_id, content, visibility, status, media_url, platforms, \
     scheduled_at, published_at, created_at, error";

impl Database {
    /// Open (creating if needed) the database and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
        }

        // Forward slashes keep the URL valid on Windows too
        let db_url = format!("sqlite://{}", expanded_path.replace('\\', "/"));
        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(DbError::SqlxError)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Integrations
    // ------------------------------------------------------------------

    /// Insert or replace the integration for (user, platform)
    ///
    /// An existing row keeps its id and creation time and is re-activated.
    pub async fn upsert_integration(&self, integration: &Integration) -> Result<Integration> {
        sqlx::query(
            r#"
            INSERT INTO integrations (
                id, user_id, platform, external_id, username, access_token,
                secondary_token, expires_at, page_id, page_token, subreddit,
                active, last_used_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
            ON CONFLICT(user_id, platform) DO UPDATE SET
                external_id = excluded.external_id,
                username = excluded.username,
                access_token = excluded.access_token,
                secondary_token = excluded.secondary_token,
                expires_at = excluded.expires_at,
                page_id = excluded.page_id,
                page_token = excluded.page_token,
                subreddit = excluded.subreddit,
                active = 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&integration.id)
        .bind(&integration.user_id)
        .bind(integration.platform.as_str())
        .bind(&integration.external_id)
        .bind(&integration.username)
        .bind(&integration.access_token)
        .bind(&integration.secondary_token)
        .bind(integration.expires_at)
        .bind(&integration.page_id)
        .bind(&integration.page_token)
        .bind(&integration.subreddit)
        .bind(integration.last_used_at)
        .bind(integration.created_at)
        .bind(integration.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        self.get_integration(&integration.user_id, integration.platform)
            .await?
            .ok_or_else(|| decode_err("integration vanished after upsert".to_string()).into())
    }

    pub async fn get_integration(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<Integration>> {
        let row = sqlx::query("SELECT * FROM integrations WHERE user_id = ? AND platform = ?")
            .bind(user_id)
            .bind(platform.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(integration_from_row).transpose()
    }

    /// All integrations for a user, active or not
    pub async fn list_integrations(&self, user_id: &str) -> Result<Vec<Integration>> {
        let rows = sqlx::query("SELECT * FROM integrations WHERE user_id = ? ORDER BY platform")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(integration_from_row).collect()
    }

    pub async fn active_integrations(&self, user_id: &str) -> Result<Vec<Integration>> {
        let rows = sqlx::query(
            "SELECT * FROM integrations WHERE user_id = ? AND active = 1 ORDER BY platform",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(integration_from_row).collect()
    }

    /// Soft-delete; returns false when there was nothing active to disable
    pub async fn deactivate_integration(
        &self,
        user_id: &str,
        platform: Platform,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE integrations SET active = 0, updated_at = ?
            WHERE user_id = ? AND platform = ? AND active = 1
            "#,
        )
        .bind(now)
        .bind(user_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Write refreshed tokens back before the publish call proceeds
    pub async fn update_integration_tokens(&self, integration: &Integration, now: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE integrations
            SET access_token = ?, secondary_token = ?, expires_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&integration.access_token)
        .bind(&integration.secondary_token)
        .bind(integration.expires_at)
        .bind(now)
        .bind(&integration.id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn touch_integration(&self, integration_id: &str, now: i64) -> Result<()> {
        sqlx::query("UPDATE integrations SET last_used_at = ? WHERE id = ?")
            .bind(now)
            .bind(integration_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    pub async fn create_post(&self, post: &Post) -> Result<()> {
        let platforms = serde_json::to_string(&post.platforms).map_err(DbError::Serialization)?;

        sqlx::query(
            r#"
            INSERT INTO posts (
                id, user_id, content, visibility, status, media_url, platforms,
                scheduled_at, published_at, created_at, error
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.content)
        .bind(post.visibility.as_str())
        .bind(post.status.as_str())
        .bind(&post.media_url)
        .bind(platforms)
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .bind(post.created_at)
        .bind(&post.error)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Persist a post together with its platform records in one transaction
    pub async fn create_post_with_records(&self, post: &Post, records: &[PostRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;
        let platforms = serde_json::to_string(&post.platforms).map_err(DbError::Serialization)?;

        sqlx::query(
            r#"
            INSERT INTO posts (
                id, user_id, content, visibility, status, media_url, platforms,
                scheduled_at, published_at, created_at, error
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.content)
        .bind(post.visibility.as_str())
        .bind(post.status.as_str())
        .bind(&post.media_url)
        .bind(platforms)
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .bind(post.created_at)
        .bind(&post.error)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        for record in records {
            insert_record(&mut tx, record).await?;
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(post_from_row).transpose()
    }

    pub async fn get_post_with_records(&self, post_id: &str) -> Result<Option<PostWithRecords>> {
        match self.get_post(post_id).await? {
            Some(post) => {
                let records = self.get_post_records(post_id).await?;
                Ok(Some(PostWithRecords { post, records }))
            }
            None => Ok(None),
        }
    }

    /// Posts for a user, newest first, optionally filtered by status
    pub async fn list_posts(
        &self,
        user_id: &str,
        status: Option<PostStatus>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM posts WHERE user_id = ? AND status = ? \
                     ORDER BY created_at DESC LIMIT ?",
                    POST_COLUMNS
                ))
                .bind(user_id)
                .bind(status.as_str())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM posts WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
                    POST_COLUMNS
                ))
                .bind(user_id)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Delete a post only while it is still a draft or scheduled
    pub async fn delete_editable_post(&self, user_id: &str, post_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM posts
            WHERE id = ? AND user_id = ? AND status IN ('draft', 'scheduled')
              AND claimed_by IS NULL
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn create_post_record(&self, record: &PostRecord) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(DbError::SqlxError)?;
        insert_record(&mut conn, record).await
    }

    pub async fn get_post_records(&self, post_id: &str) -> Result<Vec<PostRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, platform, platform_post_id, url, success,
                   error_code, error_message, attempted_at
            FROM post_records
            WHERE post_id = ?
            ORDER BY id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(record_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Scheduled posts
    // ------------------------------------------------------------------

    /// Unclaimed scheduled posts whose time has come, oldest first
    pub async fn due_scheduled_posts(&self, now: i64, limit: u32) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM posts \
             WHERE status = 'scheduled' AND scheduled_at <= ? AND claimed_by IS NULL \
             ORDER BY scheduled_at ASC, created_at ASC LIMIT ?",
            POST_COLUMNS
        ))
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Atomically claim a due post for one scheduler instance
    pub async fn claim_scheduled_post(&self, post_id: &str, claimant: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts SET claimed_by = ?, claimed_at = ?
            WHERE id = ? AND status = 'scheduled' AND claimed_by IS NULL
            "#,
        )
        .bind(claimant)
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Free claims left behind by an instance that died mid-tick
    pub async fn release_stale_claims(&self, claimed_before: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE posts SET claimed_by = NULL, claimed_at = NULL
            WHERE status = 'scheduled' AND claimed_by IS NOT NULL AND claimed_at < ?
            "#,
        )
        .bind(claimed_before)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    /// Move a claimed scheduled post to its terminal state
    ///
    /// Guarded by status and claimant, so a post that already left
    /// `scheduled` is never touched again.
    pub async fn finalize_scheduled_post(
        &self,
        post_id: &str,
        claimant: &str,
        outcome: &ScheduledOutcome,
        records: &[PostRecord],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;
        let platforms =
            serde_json::to_string(&outcome.platforms).map_err(DbError::Serialization)?;

        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = ?, platforms = ?, published_at = ?, error = ?,
                claimed_by = NULL, claimed_at = NULL
            WHERE id = ? AND status = 'scheduled' AND claimed_by = ?
            "#,
        )
        .bind(outcome.status.as_str())
        .bind(platforms)
        .bind(outcome.published_at)
        .bind(&outcome.error)
        .bind(post_id)
        .bind(claimant)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() != 1 {
            tx.rollback().await.map_err(DbError::SqlxError)?;
            return Ok(false);
        }

        for record in records {
            insert_record(&mut tx, record).await?;
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Rate limit counters
    // ------------------------------------------------------------------

    /// Atomic upsert-increment of one daily counter
    pub async fn increment_counter(&self, day: &str, platform: Platform, scope_key: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rate_limit_counters (day, platform, scope_key, count)
            VALUES (?, ?, ?, 1)
            ON CONFLICT(day, platform, scope_key)
            DO UPDATE SET count = count + 1
            "#,
        )
        .bind(day)
        .bind(platform.as_str())
        .bind(scope_key)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Increment one daily counter only while it is below `limit`
    ///
    /// Returns `false`, leaving the counter alone, when it already reached
    /// the limit. Check and increment are one statement, so concurrent
    /// callers can never push the counter past `limit`.
    pub async fn try_increment_counter(
        &self,
        day: &str,
        platform: Platform,
        scope_key: &str,
        limit: u32,
    ) -> Result<bool> {
        if limit == 0 {
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO rate_limit_counters (day, platform, scope_key, count)
            VALUES (?, ?, ?, 1)
            ON CONFLICT(day, platform, scope_key)
            DO UPDATE SET count = count + 1 WHERE count < ?
            "#,
        )
        .bind(day)
        .bind(platform.as_str())
        .bind(scope_key)
        .bind(limit as i64)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Undo one increment; never goes below zero
    pub async fn decrement_counter(&self, day: &str, platform: Platform, scope_key: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE rate_limit_counters SET count = count - 1
            WHERE day = ? AND platform = ? AND scope_key = ? AND count > 0
            "#,
        )
        .bind(day)
        .bind(platform.as_str())
        .bind(scope_key)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn counter_value(&self, day: &str, platform: Platform, scope_key: &str) -> Result<u32> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT count FROM rate_limit_counters
            WHERE day = ? AND platform = ? AND scope_key = ?
            "#,
        )
        .bind(day)
        .bind(platform.as_str())
        .bind(scope_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| r.0).unwrap_or(0) as u32)
    }

    /// Delete counters for days before `day` (ISO dates sort lexically)
    pub async fn delete_counters_before(&self, day: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rate_limit_counters WHERE day < ?")
            .bind(day)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    // ------------------------------------------------------------------
    // Pending selections
    // ------------------------------------------------------------------

    pub async fn create_pending_selection(&self, selection: &PendingSelection) -> Result<()> {
        let options = serde_json::to_string(&selection.options).map_err(DbError::Serialization)?;

        sqlx::query(
            r#"
            INSERT INTO pending_selections (id, user_id, platform, user_token, options, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&selection.id)
        .bind(&selection.user_id)
        .bind(selection.platform.as_str())
        .bind(&selection.user_token)
        .bind(options)
        .bind(selection.created_at)
        .bind(selection.expires_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Remove and return a selection; it can be consumed only once
    pub async fn take_pending_selection(
        &self,
        selection_id: &str,
        user_id: &str,
    ) -> Result<Option<PendingSelection>> {
        let row = sqlx::query(
            r#"
            DELETE FROM pending_selections WHERE id = ? AND user_id = ?
            RETURNING id, user_id, platform, user_token, options, created_at, expires_at
            "#,
        )
        .bind(selection_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(selection_from_row).transpose()
    }

    pub async fn purge_expired_selections(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM pending_selections WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }
}

/// Terminal state written by the scheduler
#[derive(Debug, Clone)]
pub struct ScheduledOutcome {
    pub status: PostStatus,
    pub platforms: Vec<Platform>,
    pub published_at: Option<i64>,
    pub error: Option<String>,
}

async fn insert_record(conn: &mut sqlx::SqliteConnection, record: &PostRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO post_records (
            post_id, platform, platform_post_id, url, success,
            error_code, error_message, attempted_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.post_id)
    .bind(record.platform.as_str())
    .bind(&record.platform_post_id)
    .bind(&record.url)
    .bind(if record.success { 1_i64 } else { 0_i64 })
    .bind(&record.error_code)
    .bind(&record.error_message)
    .bind(record.attempted_at)
    .execute(conn)
    .await
    .map_err(DbError::SqlxError)?;

    Ok(())
}
