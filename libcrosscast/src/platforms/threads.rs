//! Threads adapter
//!
//! Same container-then-publish flow as Instagram, on the Threads Graph
//! host. Text-only posts are allowed; an image url makes it an IMAGE post.

use async_trait::async_trait;
use reqwest::Client;

use super::http::{missing_field, send_json, string_at};
use super::poll::{Poller, Readiness};
use super::{require, Adapter};
use crate::config::ThreadsConfig;
use crate::error::PlatformResult;
use crate::types::{Integration, Platform, PublishContent, Published};

pub const THREADS_LIMIT: usize = 500;

pub struct ThreadsAdapter {
    client: Client,
    graph_base: String,
    poller: Poller,
}

impl ThreadsAdapter {
    pub fn new(client: Client, config: &ThreadsConfig, poller: Poller) -> Self {
        Self {
            client,
            graph_base: config.graph_base.trim_end_matches('/').to_string(),
            poller,
        }
    }

    /// Profile url used when the permalink lookup fails
    pub fn profile_url(username: Option<&str>) -> String {
        match username.filter(|u| !u.is_empty()) {
            Some(username) => format!("https://www.threads.net/@{}", username.trim_start_matches('@')),
            None => "https://www.threads.net".to_string(),
        }
    }

    async fn container_status(&self, container_id: &str, token: &str) -> PlatformResult<Readiness> {
        let request = self
            .client
            .get(format!("{}/{}", self.graph_base, container_id))
            .query(&[("fields", "status"), ("access_token", token)]);

        let response = send_json(Platform::Threads, request).await?;
        let status = string_at(&response.body, "/status")
            .ok_or_else(|| missing_field(Platform::Threads, "status"))?;
        Ok(Readiness::from_status(&status))
    }

    async fn permalink(&self, thread_id: &str, token: &str) -> Option<String> {
        let request = self
            .client
            .get(format!("{}/{}", self.graph_base, thread_id))
            .query(&[("fields", "permalink"), ("access_token", token)]);

        match send_json(Platform::Threads, request).await {
            Ok(response) => string_at(&response.body, "/permalink"),
            Err(e) => {
                tracing::warn!(thread_id, error = %e, "Could not fetch Threads permalink");
                None
            }
        }
    }
}

#[async_trait]
impl Adapter for ThreadsAdapter {
    fn platform(&self) -> Platform {
        Platform::Threads
    }

    fn character_limit(&self) -> Option<usize> {
        Some(THREADS_LIMIT)
    }

    fn check_credentials(&self, integration: &Integration) -> PlatformResult<()> {
        require(Some(integration.access_token.as_str()), "Threads access token")?;
        require(integration.external_id.as_deref(), "Threads user id")?;
        Ok(())
    }

    async fn publish(
        &self,
        integration: &Integration,
        content: &PublishContent,
    ) -> PlatformResult<Published> {
        self.validate(integration, content)?;
        let user_id = require(integration.external_id.as_deref(), "Threads user id")?;
        let token = integration.access_token.as_str();

        let mut params = vec![("text", content.text.as_str()), ("access_token", token)];
        match content.media_url.as_deref() {
            Some(image_url) => {
                params.push(("media_type", "IMAGE"));
                params.push(("image_url", image_url));
            }
            None => params.push(("media_type", "TEXT")),
        }

        let create = self
            .client
            .post(format!("{}/{}/threads", self.graph_base, user_id))
            .form(&params);
        let container_id = string_at(&send_json(Platform::Threads, create).await?.body, "/id")
            .ok_or_else(|| missing_field(Platform::Threads, "container id"))?;
        tracing::debug!(container_id = %container_id, "Created Threads container");

        let container = container_id.as_str();
        self.poller
            .wait_until_ready("Threads container", move || async move {
                self.container_status(container, token).await
            })
            .await?;

        let publish = self
            .client
            .post(format!("{}/{}/threads_publish", self.graph_base, user_id))
            .query(&[("creation_id", container), ("access_token", token)]);
        let thread_id = string_at(&send_json(Platform::Threads, publish).await?.body, "/id")
            .ok_or_else(|| missing_field(Platform::Threads, "thread id"))?;

        let url = match self.permalink(&thread_id, token).await {
            Some(url) => url,
            None => Self::profile_url(integration.username.as_deref()),
        };

        tracing::info!(thread_id = %thread_id, "Posted to Threads");
        Ok(Published { id: thread_id, url })
    }
}
