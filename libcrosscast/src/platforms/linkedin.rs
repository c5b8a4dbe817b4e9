//! LinkedIn adapter
//!
//! Shares go through the UGC Posts API as the member identified by the
//! integration's `external_id`. LinkedIn enforces daily call quotas, which
//! the orchestrator checks through the rate limiter before calling here.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::http::{missing_field, send_json, string_at};
use super::{require, Adapter};
use crate::config::LinkedinConfig;
use crate::error::PlatformResult;
use crate::types::{Integration, Platform, PublishContent, Published, Visibility};

pub const LINKEDIN_LIMIT: usize = 3000;

pub struct LinkedinAdapter {
    client: Client,
    api_base: String,
}

impl LinkedinAdapter {
    pub fn new(client: Client, config: &LinkedinConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Request body for a UGC share
    pub fn share_body(member_id: &str, content: &PublishContent) -> Value {
        let visibility = match content.visibility {
            Visibility::Public => "PUBLIC",
            Visibility::Connections => "CONNECTIONS",
        };

        let share = match &content.media_url {
            Some(url) => json!({
                "shareCommentary": { "text": content.text },
                "shareMediaCategory": "ARTICLE",
                "media": [{ "status": "READY", "originalUrl": url }],
            }),
            None => json!({
                "shareCommentary": { "text": content.text },
                "shareMediaCategory": "NONE",
            }),
        };

        json!({
            "author": format!("urn:li:person:{}", member_id),
            "lifecycleState": "PUBLISHED",
            "specificContent": { "com.linkedin.ugc.ShareContent": share },
            "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": visibility },
        })
    }
}

#[async_trait]
impl Adapter for LinkedinAdapter {
    fn platform(&self) -> Platform {
        Platform::Linkedin
    }

    fn character_limit(&self) -> Option<usize> {
        Some(LINKEDIN_LIMIT)
    }

    fn check_credentials(&self, integration: &Integration) -> PlatformResult<()> {
        require(Some(integration.access_token.as_str()), "LinkedIn access token")?;
        require(integration.external_id.as_deref(), "LinkedIn member id")?;
        Ok(())
    }

    async fn publish(
        &self,
        integration: &Integration,
        content: &PublishContent,
    ) -> PlatformResult<Published> {
        self.validate(integration, content)?;
        let member_id = require(integration.external_id.as_deref(), "LinkedIn member id")?;

        let request = self
            .client
            .post(format!("{}/v2/ugcPosts", self.api_base))
            .bearer_auth(&integration.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&Self::share_body(member_id, content));

        let response = send_json(Platform::Linkedin, request).await?;

        // The share URN comes back in a header; some API versions echo it in the body
        let id = response
            .headers
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| string_at(&response.body, "/id"))
            .ok_or_else(|| missing_field(Platform::Linkedin, "x-restli-id"))?;

        tracing::info!(share_id = %id, "Posted to LinkedIn");
        Ok(Published {
            url: format!("https://www.linkedin.com/feed/update/{}", id),
            id,
        })
    }
}
