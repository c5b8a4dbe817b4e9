//! Connection service
//!
//! Turns completed OAuth handshakes into integration records. The OAuth
//! redirect dance itself happens in the caller; what arrives here is the
//! resulting token set.
//!
//! Facebook needs one more step: the user token is exchanged for the list
//! of pages the user manages and the user picks one. The list is parked in
//! a short-lived, user-scoped pending selection until the pick arrives.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{CrosscastError, PlatformResult, Result};
use crate::platforms::facebook::FacebookAdapter;
use crate::types::{Integration, PageOption, PendingSelection, Platform};

/// How long a page list waits for the user's pick
pub const SELECTION_TTL_SECS: i64 = 15 * 60;

/// Source of the pages a user token can publish to
#[async_trait]
pub trait PageDirectory: Send + Sync {
    async fn fetch_pages(&self, user_token: &str) -> PlatformResult<Vec<PageOption>>;
}

#[async_trait]
impl PageDirectory for FacebookAdapter {
    async fn fetch_pages(&self, user_token: &str) -> PlatformResult<Vec<PageOption>> {
        FacebookAdapter::fetch_pages(self, user_token).await
    }
}

#[derive(Clone)]
pub struct ConnectionService {
    db: Arc<Database>,
    pages: Arc<dyn PageDirectory>,
}

impl ConnectionService {
    pub fn new(db: Arc<Database>, pages: Arc<dyn PageDirectory>) -> Self {
        Self { db, pages }
    }

    /// Store (or replace) the user's integration for its platform
    ///
    /// Reconnecting a disconnected platform re-activates the same record.
    pub async fn connect(&self, integration: Integration) -> Result<Integration> {
        if integration.user_id.trim().is_empty() {
            return Err(CrosscastError::InvalidInput("User id cannot be empty".to_string()));
        }
        if integration.access_token.trim().is_empty() {
            return Err(CrosscastError::InvalidInput(format!(
                "{} access token cannot be empty",
                integration.platform
            )));
        }

        let stored = self.db.upsert_integration(&integration).await?;
        tracing::info!(
            user_id = %stored.user_id,
            platform = %stored.platform,
            "Connected integration"
        );
        Ok(stored)
    }

    /// Deactivate the user's integration for `platform`
    pub async fn disconnect(&self, user_id: &str, platform: Platform, now: i64) -> Result<()> {
        if !self.db.deactivate_integration(user_id, platform, now).await? {
            return Err(CrosscastError::NotFound(format!(
                "active {} integration",
                platform
            )));
        }
        tracing::info!(user_id, %platform, "Disconnected integration");
        Ok(())
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<Integration>> {
        self.db.list_integrations(user_id).await
    }

    /// Fetch the user's Facebook pages and park them for selection
    pub async fn begin_page_selection(
        &self,
        user_id: &str,
        user_token: &str,
        now: i64,
    ) -> Result<PendingSelection> {
        let options = self.pages.fetch_pages(user_token).await?;
        if options.is_empty() {
            return Err(CrosscastError::InvalidInput(
                "This Facebook account does not manage any pages".to_string(),
            ));
        }

        let selection = PendingSelection {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            platform: Platform::Facebook,
            user_token: user_token.to_string(),
            options,
            created_at: now,
            expires_at: now + SELECTION_TTL_SECS,
        };
        self.db.create_pending_selection(&selection).await?;

        tracing::debug!(selection_id = %selection.id, pages = selection.options.len(), "Started page selection");
        Ok(selection)
    }

    /// Finish a page selection and store the Facebook integration
    ///
    /// A selection is consumed by the first successful pick. Expired
    /// selections are deleted and rejected.
    pub async fn complete_page_selection(
        &self,
        user_id: &str,
        selection_id: &str,
        page_id: &str,
        now: i64,
    ) -> Result<Integration> {
        let selection = self
            .db
            .take_pending_selection(selection_id, user_id)
            .await?
            .ok_or_else(|| CrosscastError::NotFound(format!("page selection {}", selection_id)))?;

        if selection.is_expired(now) {
            return Err(CrosscastError::InvalidInput(
                "Page selection expired; connect Facebook again".to_string(),
            ));
        }

        let page = match selection.options.iter().find(|p| p.id == page_id) {
            Some(page) => page.clone(),
            None => {
                // Wrong pick: put the selection back so the user can try again
                self.db.create_pending_selection(&selection).await?;
                return Err(CrosscastError::InvalidInput(format!(
                    "Page {} is not one of the offered pages",
                    page_id
                )));
            }
        };

        let mut integration = Integration::new(user_id, Platform::Facebook, &selection.user_token);
        integration.external_id = Some(page.id.clone());
        integration.username = Some(page.name);
        integration.page_id = Some(page.id);
        integration.page_token = Some(page.access_token);
        integration.created_at = now;
        integration.updated_at = now;

        self.connect(integration).await
    }

    /// Delete selections nobody finished
    pub async fn purge_expired_selections(&self, now: i64) -> Result<u64> {
        self.db.purge_expired_selections(now).await
    }
}
