//! Facebook Page adapter
//!
//! Publishes as a Page using the page access token chosen during the
//! connect flow. Text goes to the page feed; a post with media is published
//! as a photo with the text as its caption.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::http::{missing_field, send_json, string_at};
use super::{require, Adapter};
use crate::config::GraphConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::types::{Integration, PageOption, Platform, PublishContent, Published};

pub const FACEBOOK_LIMIT: usize = 63_206;

pub struct FacebookAdapter {
    client: Client,
    graph_base: String,
}

#[derive(Debug, Deserialize)]
struct AccountsPage {
    #[serde(default)]
    data: Vec<PageOption>,
}

impl FacebookAdapter {
    pub fn new(client: Client, config: &GraphConfig) -> Self {
        Self {
            client,
            graph_base: config.graph_base.trim_end_matches('/').to_string(),
        }
    }

    /// Pages the user can publish to, with their page tokens
    pub async fn fetch_pages(&self, user_token: &str) -> PlatformResult<Vec<PageOption>> {
        let request = self
            .client
            .get(format!("{}/me/accounts", self.graph_base))
            .query(&[
                ("fields", "id,name,access_token"),
                ("access_token", user_token),
            ]);

        let response = send_json(Platform::Facebook, request).await?;
        let accounts: AccountsPage =
            serde_json::from_value(response.body).map_err(|e| PlatformError::PlatformRejected {
                status: None,
                message: format!("unexpected page list shape: {}", e),
            })?;

        tracing::debug!(count = accounts.data.len(), "Fetched Facebook pages");
        Ok(accounts.data)
    }
}

#[async_trait]
impl Adapter for FacebookAdapter {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn character_limit(&self) -> Option<usize> {
        Some(FACEBOOK_LIMIT)
    }

    fn check_credentials(&self, integration: &Integration) -> PlatformResult<()> {
        require(integration.page_id.as_deref(), "Facebook page id")?;
        require(integration.page_token.as_deref(), "Facebook page token")?;
        Ok(())
    }

    async fn publish(
        &self,
        integration: &Integration,
        content: &PublishContent,
    ) -> PlatformResult<Published> {
        self.validate(integration, content)?;
        let page_id = require(integration.page_id.as_deref(), "Facebook page id")?;
        let page_token = require(integration.page_token.as_deref(), "Facebook page token")?;

        let request = match &content.media_url {
            Some(media_url) => self
                .client
                .post(format!("{}/{}/photos", self.graph_base, page_id))
                .form(&[
                    ("url", media_url.as_str()),
                    ("caption", content.text.as_str()),
                    ("access_token", page_token),
                ]),
            None => self
                .client
                .post(format!("{}/{}/feed", self.graph_base, page_id))
                .form(&[
                    ("message", content.text.as_str()),
                    ("access_token", page_token),
                ]),
        };

        let response = send_json(Platform::Facebook, request).await?;

        // Photos return both the photo id and the feed story id; link the story
        let id = string_at(&response.body, "/post_id")
            .or_else(|| string_at(&response.body, "/id"))
            .ok_or_else(|| missing_field(Platform::Facebook, "id"))?;

        tracing::info!(post_id = %id, page_id, "Posted to Facebook");
        Ok(Published {
            url: format!("https://www.facebook.com/{}", id),
            id,
        })
    }
}
