//! Daily quota tracking for quota-constrained platforms
//!
//! Each platform with a configured ceiling gets two counters per UTC day:
//! one shared by the whole application (`app`) and one per user. A send may
//! proceed only while both are below their ceilings.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::config::RateLimitConfig;
use crate::error::Result;
use crate::types::Platform;
use crate::Database;

/// Scope key for the application-wide counter
pub const APP_SCOPE: &str = "app";

/// Rate limiter for platform quotas
#[derive(Debug, Clone)]
pub struct DailyRateLimiter {
    limits: HashMap<Platform, RateLimitConfig>,
}

impl DailyRateLimiter {
    pub fn new(limits: HashMap<Platform, RateLimitConfig>) -> Self {
        Self { limits }
    }

    pub fn is_limited(&self, platform: Platform) -> bool {
        self.limits.contains_key(&platform)
    }

    /// Check both of today's counters without recording anything
    ///
    /// Unconfigured platforms always proceed.
    pub async fn can_proceed(
        &self,
        db: &Database,
        platform: Platform,
        user_id: &str,
        now: i64,
    ) -> Result<bool> {
        let limit = match self.limits.get(&platform) {
            Some(l) => *l,
            None => return Ok(true),
        };

        let day = day_key(now);
        let app_count = db.counter_value(&day, platform, APP_SCOPE).await?;
        if app_count >= limit.app_daily {
            tracing::debug!(%platform, app_count, "Application daily quota exhausted");
            return Ok(false);
        }

        let user_count = db.counter_value(&day, platform, user_id).await?;
        if user_count >= limit.user_daily {
            tracing::debug!(%platform, user_id, user_count, "User daily quota exhausted");
            return Ok(false);
        }

        Ok(true)
    }

    /// Take one unit of today's app and user quota before sending
    ///
    /// Returns `false` with nothing taken when either ceiling is reached.
    /// Each counter only moves through a conditional increment, so parallel
    /// sends can never overshoot a ceiling. Pair a reservation whose send
    /// fails with [`DailyRateLimiter::release`].
    pub async fn try_reserve(
        &self,
        db: &Database,
        platform: Platform,
        user_id: &str,
        now: i64,
    ) -> Result<bool> {
        let limit = match self.limits.get(&platform) {
            Some(l) => *l,
            None => return Ok(true),
        };

        let day = day_key(now);
        if !db.try_increment_counter(&day, platform, APP_SCOPE, limit.app_daily).await? {
            tracing::debug!(%platform, "Application daily quota exhausted");
            return Ok(false);
        }

        let user_reserved = match db
            .try_increment_counter(&day, platform, user_id, limit.user_daily)
            .await
        {
            Ok(reserved) => reserved,
            Err(e) => {
                self.undo(db, &day, platform, APP_SCOPE).await;
                return Err(e);
            }
        };
        if !user_reserved {
            self.undo(db, &day, platform, APP_SCOPE).await;
            tracing::debug!(%platform, user_id, "User daily quota exhausted");
            return Ok(false);
        }

        Ok(true)
    }

    /// Give back a reservation whose send did not go out
    ///
    /// `now` must be the time the reservation was taken with.
    pub async fn release(&self, db: &Database, platform: Platform, user_id: &str, now: i64) {
        if !self.is_limited(platform) {
            return;
        }

        let day = day_key(now);
        for scope in [APP_SCOPE, user_id] {
            self.undo(db, &day, platform, scope).await;
        }
    }

    async fn undo(&self, db: &Database, day: &str, platform: Platform, scope: &str) {
        if let Err(e) = db.decrement_counter(day, platform, scope).await {
            tracing::warn!(%platform, scope, error = %e, "Failed to release quota reservation");
        }
    }

    /// Count one successful call against today's app and user counters
    ///
    /// A failed increment is logged and swallowed: the post already went out.
    pub async fn record_use(&self, db: &Database, platform: Platform, user_id: &str, now: i64) {
        if !self.is_limited(platform) {
            return;
        }

        let day = day_key(now);
        for scope in [APP_SCOPE, user_id] {
            if let Err(e) = db.increment_counter(&day, platform, scope).await {
                tracing::warn!(%platform, scope, error = %e, "Failed to record quota use");
            }
        }
    }

    /// Today's count for one scope key
    pub async fn usage(&self, db: &Database, platform: Platform, key: &str, now: i64) -> Result<u32> {
        db.counter_value(&day_key(now), platform, key).await
    }

    /// Delete counters for days before the day containing `cutoff`
    pub async fn cleanup_before(&self, db: &Database, cutoff: i64) -> Result<u64> {
        db.delete_counters_before(&day_key(cutoff)).await
    }
}

/// UTC calendar date for a timestamp, e.g. `2026-03-01`
pub fn day_key(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // 2026-03-01T12:00:00Z
    const NOON: i64 = 1_772_366_400;
    const DAY: i64 = 86_400;

    async fn setup_test_db() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(&db_path.to_string_lossy()).await.unwrap();
        (temp_dir, db)
    }

    fn limiter(app_daily: u32, user_daily: u32) -> DailyRateLimiter {
        DailyRateLimiter::new(HashMap::from([(
            Platform::Linkedin,
            RateLimitConfig {
                app_daily,
                user_daily,
            },
        )]))
    }

    #[test]
    fn test_day_key_is_utc_date() {
        assert_eq!(day_key(NOON), "2026-03-01");
        assert_eq!(day_key(NOON + 12 * 3600 - 1), "2026-03-01");
        assert_eq!(day_key(NOON + 12 * 3600), "2026-03-02");
        assert_eq!(day_key(0), "1970-01-01");
    }

    #[tokio::test]
    async fn test_unconfigured_platform_always_proceeds() {
        let (_temp, db) = setup_test_db().await;
        let limiter = limiter(0, 0);

        assert!(!limiter.is_limited(Platform::Twitter));
        assert!(limiter
            .can_proceed(&db, Platform::Twitter, "alice", NOON)
            .await
            .unwrap());

        limiter.record_use(&db, Platform::Twitter, "alice", NOON).await;
        assert_eq!(
            limiter.usage(&db, Platform::Twitter, APP_SCOPE, NOON).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_user_ceiling_blocks_only_that_user() {
        let (_temp, db) = setup_test_db().await;
        let limiter = limiter(500, 2);

        for _ in 0..2 {
            assert!(limiter.can_proceed(&db, Platform::Linkedin, "alice", NOON).await.unwrap());
            limiter.record_use(&db, Platform::Linkedin, "alice", NOON).await;
        }

        assert!(!limiter.can_proceed(&db, Platform::Linkedin, "alice", NOON).await.unwrap());
        assert!(limiter.can_proceed(&db, Platform::Linkedin, "bob", NOON).await.unwrap());
    }

    #[tokio::test]
    async fn test_app_ceiling_blocks_everyone() {
        let (_temp, db) = setup_test_db().await;
        let limiter = limiter(3, 100);

        for user in ["alice", "bob", "carol"] {
            limiter.record_use(&db, Platform::Linkedin, user, NOON).await;
        }

        assert_eq!(limiter.usage(&db, Platform::Linkedin, APP_SCOPE, NOON).await.unwrap(), 3);
        assert!(!limiter.can_proceed(&db, Platform::Linkedin, "dave", NOON).await.unwrap());
    }

    #[tokio::test]
    async fn test_counters_roll_over_at_utc_midnight() {
        let (_temp, db) = setup_test_db().await;
        let limiter = limiter(500, 1);

        limiter.record_use(&db, Platform::Linkedin, "alice", NOON).await;
        assert!(!limiter.can_proceed(&db, Platform::Linkedin, "alice", NOON).await.unwrap());

        let tomorrow = NOON + DAY;
        assert!(limiter.can_proceed(&db, Platform::Linkedin, "alice", tomorrow).await.unwrap());
        assert_eq!(limiter.usage(&db, Platform::Linkedin, "alice", tomorrow).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_record_use_loses_no_updates() {
        let (_temp, db) = setup_test_db().await;
        let limiter = limiter(500, 100);

        let calls = (0..20).map(|_| limiter.record_use(&db, Platform::Linkedin, "alice", NOON));
        futures::future::join_all(calls).await;

        assert_eq!(limiter.usage(&db, Platform::Linkedin, APP_SCOPE, NOON).await.unwrap(), 20);
        assert_eq!(limiter.usage(&db, Platform::Linkedin, "alice", NOON).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_reserve_and_release() {
        let (_temp, db) = setup_test_db().await;
        let limiter = limiter(500, 1);

        assert!(limiter.try_reserve(&db, Platform::Linkedin, "alice", NOON).await.unwrap());
        assert!(!limiter.try_reserve(&db, Platform::Linkedin, "alice", NOON).await.unwrap());

        // The refused user reservation hands back its app unit
        assert_eq!(limiter.usage(&db, Platform::Linkedin, APP_SCOPE, NOON).await.unwrap(), 1);

        limiter.release(&db, Platform::Linkedin, "alice", NOON).await;
        assert_eq!(limiter.usage(&db, Platform::Linkedin, APP_SCOPE, NOON).await.unwrap(), 0);
        assert_eq!(limiter.usage(&db, Platform::Linkedin, "alice", NOON).await.unwrap(), 0);
        assert!(limiter.try_reserve(&db, Platform::Linkedin, "alice", NOON).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_exceed_ceiling() {
        let (_temp, db) = setup_test_db().await;
        let limiter = limiter(5, 100);

        let calls = (0..20).map(|i| {
            let user = format!("user-{}", i);
            let limiter = &limiter;
            let db = &db;
            async move { limiter.try_reserve(db, Platform::Linkedin, &user, NOON).await.unwrap() }
        });
        let granted = futures::future::join_all(calls)
            .await
            .into_iter()
            .filter(|granted| *granted)
            .count();

        assert_eq!(granted, 5);
        assert_eq!(limiter.usage(&db, Platform::Linkedin, APP_SCOPE, NOON).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_cleanup_before_keeps_current_day() {
        let (_temp, db) = setup_test_db().await;
        let limiter = limiter(500, 100);

        limiter.record_use(&db, Platform::Linkedin, "alice", NOON - 2 * DAY).await;
        limiter.record_use(&db, Platform::Linkedin, "alice", NOON).await;

        let deleted = limiter.cleanup_before(&db, NOON).await.unwrap();
        assert_eq!(deleted, 2, "app and user counters from the old day");
        assert_eq!(limiter.usage(&db, Platform::Linkedin, "alice", NOON).await.unwrap(), 1);
    }
}
