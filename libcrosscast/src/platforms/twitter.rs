//! Twitter/X adapter
//!
//! Posts through the v2 API with an OAuth 2.0 user bearer token.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::http::{missing_field, send_json, string_at};
use super::{require, Adapter};
use crate::config::TwitterConfig;
use crate::error::PlatformResult;
use crate::types::{Integration, Platform, PublishContent, Published};

pub const TWITTER_LIMIT: usize = 280;

pub struct TwitterAdapter {
    client: Client,
    api_base: String,
}

impl TwitterAdapter {
    pub fn new(client: Client, config: &TwitterConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Public url for a tweet; `i` stands in for an unknown handle
    pub fn status_url(username: Option<&str>, id: &str) -> String {
        let handle = username
            .map(|u| u.trim_start_matches('@'))
            .filter(|u| !u.is_empty())
            .unwrap_or("i");
        format!("https://x.com/{}/status/{}", handle, id)
    }
}

#[async_trait]
impl Adapter for TwitterAdapter {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn character_limit(&self) -> Option<usize> {
        Some(TWITTER_LIMIT)
    }

    fn check_credentials(&self, integration: &Integration) -> PlatformResult<()> {
        require(Some(integration.access_token.as_str()), "Twitter access token")?;
        Ok(())
    }

    async fn publish(
        &self,
        integration: &Integration,
        content: &PublishContent,
    ) -> PlatformResult<Published> {
        self.validate(integration, content)?;
        if let Some(media_url) = content.media_url.as_deref() {
            tracing::warn!(media_url, "Twitter media upload is not supported; posting text only");
        }

        let request = self
            .client
            .post(format!("{}/2/tweets", self.api_base))
            .bearer_auth(&integration.access_token)
            .json(&json!({ "text": content.text }));

        let response = send_json(Platform::Twitter, request).await?;
        let id = string_at(&response.body, "/data/id")
            .ok_or_else(|| missing_field(Platform::Twitter, "data.id"))?;

        tracing::info!(tweet_id = %id, "Posted to Twitter");
        Ok(Published {
            url: Self::status_url(integration.username.as_deref(), &id),
            id,
        })
    }
}
