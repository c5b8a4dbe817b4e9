//! Instagram adapter
//!
//! Content publishing is two-step: create a media container from an image
//! url, wait for Instagram to finish processing it, then publish the
//! container. Text-only posts are not possible.

use async_trait::async_trait;
use reqwest::Client;

use super::http::{missing_field, send_json, string_at};
use super::poll::{Poller, Readiness};
use super::{require, validate_text, Adapter};
use crate::config::GraphConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::types::{Integration, Platform, PublishContent, Published};

pub const INSTAGRAM_CAPTION_LIMIT: usize = 2200;

pub struct InstagramAdapter {
    client: Client,
    graph_base: String,
    poller: Poller,
}

impl InstagramAdapter {
    pub fn new(client: Client, config: &GraphConfig, poller: Poller) -> Self {
        Self {
            client,
            graph_base: config.graph_base.trim_end_matches('/').to_string(),
            poller,
        }
    }

    async fn container_status(&self, container_id: &str, token: &str) -> PlatformResult<Readiness> {
        let request = self
            .client
            .get(format!("{}/{}", self.graph_base, container_id))
            .query(&[("fields", "status_code"), ("access_token", token)]);

        let response = send_json(Platform::Instagram, request).await?;
        let status = string_at(&response.body, "/status_code")
            .ok_or_else(|| missing_field(Platform::Instagram, "status_code"))?;
        Ok(Readiness::from_status(&status))
    }

    async fn permalink(&self, media_id: &str, token: &str) -> Option<String> {
        let request = self
            .client
            .get(format!("{}/{}", self.graph_base, media_id))
            .query(&[("fields", "permalink"), ("access_token", token)]);

        match send_json(Platform::Instagram, request).await {
            Ok(response) => string_at(&response.body, "/permalink"),
            Err(e) => {
                tracing::warn!(media_id, error = %e, "Could not fetch Instagram permalink");
                None
            }
        }
    }
}

#[async_trait]
impl Adapter for InstagramAdapter {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn character_limit(&self) -> Option<usize> {
        Some(INSTAGRAM_CAPTION_LIMIT)
    }

    fn validate_content(&self, content: &PublishContent) -> PlatformResult<()> {
        validate_text(&content.text, self.character_limit())?;
        if content.media_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
            return Err(PlatformError::Validation(
                "Instagram posts require an image".to_string(),
            ));
        }
        Ok(())
    }

    fn check_credentials(&self, integration: &Integration) -> PlatformResult<()> {
        require(Some(integration.access_token.as_str()), "Instagram access token")?;
        require(integration.external_id.as_deref(), "Instagram business account id")?;
        Ok(())
    }

    async fn publish(
        &self,
        integration: &Integration,
        content: &PublishContent,
    ) -> PlatformResult<Published> {
        self.validate(integration, content)?;
        let ig_user = require(integration.external_id.as_deref(), "Instagram business account id")?;
        let image_url = require(content.media_url.as_deref(), "image url")?;
        let token = integration.access_token.as_str();

        let create = self
            .client
            .post(format!("{}/{}/media", self.graph_base, ig_user))
            .form(&[
                ("image_url", image_url),
                ("caption", content.text.as_str()),
                ("access_token", token),
            ]);
        let container_id = string_at(&send_json(Platform::Instagram, create).await?.body, "/id")
            .ok_or_else(|| missing_field(Platform::Instagram, "container id"))?;
        tracing::debug!(container_id = %container_id, "Created Instagram media container");

        let container = container_id.as_str();
        self.poller
            .wait_until_ready("Instagram media container", move || async move {
                self.container_status(container, token).await
            })
            .await?;

        let publish = self
            .client
            .post(format!("{}/{}/media_publish", self.graph_base, ig_user))
            .form(&[("creation_id", container), ("access_token", token)]);
        let media_id = string_at(&send_json(Platform::Instagram, publish).await?.body, "/id")
            .ok_or_else(|| missing_field(Platform::Instagram, "media id"))?;

        let url = match self.permalink(&media_id, token).await {
            Some(url) => url,
            None => match integration.username.as_deref() {
                Some(username) => format!("https://www.instagram.com/{}", username),
                None => "https://www.instagram.com".to_string(),
            },
        };

        tracing::info!(media_id = %media_id, "Posted to Instagram");
        Ok(Published { id: media_id, url })
    }
}
