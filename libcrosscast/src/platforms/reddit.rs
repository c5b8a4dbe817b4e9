//! Reddit adapter
//!
//! Submits a self post to the integration's subreddit. Reddit titles are
//! capped at 300 characters, so longer text is split: the first 300
//! characters become the title and the rest the body.
//!
//! Reddit access tokens expire after an hour. This is the one adapter that
//! refreshes credentials, using the stored refresh token and the app's
//! client id and secret.

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::http::{missing_field, send_json, string_at};
use super::{require, Adapter};
use crate::config::RedditConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::types::{Integration, Platform, PublishContent, Published};

pub const REDDIT_TITLE_LIMIT: usize = 300;

/// Default token lifetime when the refresh response omits `expires_in`
const DEFAULT_TOKEN_TTL: i64 = 3600;

pub struct RedditAdapter {
    client: Client,
    api_base: String,
    auth_base: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    user_agent: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

/// Split post text into (title, body) at the title limit
pub fn split_title(text: &str) -> (String, String) {
    match text.char_indices().nth(REDDIT_TITLE_LIMIT) {
        Some((byte_index, _)) => (text[..byte_index].to_string(), text[byte_index..].to_string()),
        None => (text.to_string(), String::new()),
    }
}

/// Collect `json.errors` entries (`[code, message, field]` triples)
fn submit_errors(body: &Value) -> Vec<String> {
    body.pointer("/json/errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .map(|e| match e.as_array() {
                    Some(parts) => parts
                        .iter()
                        .take(2)
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(": "),
                    None => e.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

impl RedditAdapter {
    pub fn new(client: Client, config: &RedditConfig, user_agent: &str) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            auth_base: config.auth_base.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            user_agent: user_agent.to_string(),
        }
    }
}

#[async_trait]
impl Adapter for RedditAdapter {
    fn platform(&self) -> Platform {
        Platform::Reddit
    }

    /// Long text is split into title and body rather than rejected
    fn character_limit(&self) -> Option<usize> {
        None
    }

    fn check_credentials(&self, integration: &Integration) -> PlatformResult<()> {
        require(Some(integration.access_token.as_str()), "Reddit access token")?;
        require(integration.subreddit.as_deref(), "Reddit subreddit")?;
        Ok(())
    }

    /// Expiry is judged against the caller's `now`; an expired token with no
    /// refresh token is `token_expired`
    async fn refresh_credentials(
        &self,
        integration: &Integration,
        now: i64,
    ) -> PlatformResult<Option<Integration>> {
        if !integration.is_expired(now) {
            return Ok(None);
        }

        let refresh_token = integration.secondary_token.as_deref().ok_or_else(|| {
            PlatformError::TokenExpired(
                "Reddit token expired and no refresh token is stored; reconnect the account"
                    .to_string(),
            )
        })?;
        let client_id = require(self.client_id.as_deref(), "Reddit client id")?;
        let client_secret = require(self.client_secret.as_deref(), "Reddit client secret")?;

        let request = self
            .client
            .post(format!("{}/api/v1/access_token", self.auth_base))
            .basic_auth(client_id, Some(client_secret))
            .header(USER_AGENT, &self.user_agent)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ]);

        let response = send_json(Platform::Reddit, request).await?;
        let token: TokenResponse =
            serde_json::from_value(response.body).map_err(|_| missing_field(Platform::Reddit, "access_token"))?;

        let mut refreshed = integration.clone();
        refreshed.access_token = token.access_token;
        refreshed.expires_at = Some(now + token.expires_in.unwrap_or(DEFAULT_TOKEN_TTL));
        if let Some(rotated) = token.refresh_token {
            refreshed.secondary_token = Some(rotated);
        }
        refreshed.updated_at = now;

        tracing::info!(integration_id = %integration.id, "Refreshed Reddit access token");
        Ok(Some(refreshed))
    }

    async fn publish(
        &self,
        integration: &Integration,
        content: &PublishContent,
    ) -> PlatformResult<Published> {
        self.validate(integration, content)?;
        let subreddit = require(integration.subreddit.as_deref(), "Reddit subreddit")?;
        let subreddit = subreddit.trim_start_matches("r/");

        let (title, body) = split_title(&content.text);
        let request = self
            .client
            .post(format!("{}/api/submit", self.api_base))
            .bearer_auth(&integration.access_token)
            .header(USER_AGENT, &self.user_agent)
            .form(&[
                ("sr", subreddit),
                ("kind", "self"),
                ("title", title.as_str()),
                ("text", body.as_str()),
                ("api_type", "json"),
            ]);

        let response = send_json(Platform::Reddit, request).await?;

        let errors = submit_errors(&response.body);
        if !errors.is_empty() {
            return Err(PlatformError::PlatformRejected {
                status: None,
                message: errors.join("; "),
            });
        }

        let url = string_at(&response.body, "/json/data/url")
            .ok_or_else(|| missing_field(Platform::Reddit, "json.data.url"))?;
        let id = string_at(&response.body, "/json/data/id")
            .or_else(|| string_at(&response.body, "/json/data/name"))
            .ok_or_else(|| missing_field(Platform::Reddit, "json.data.id"))?;

        tracing::info!(submission_id = %id, subreddit, "Posted to Reddit");
        Ok(Published { id, url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> RedditAdapter {
        RedditAdapter::new(Client::new(), &RedditConfig::default(), "crosscast-test")
    }

    #[test]
    fn test_split_title_short_text() {
        let (title, body) = split_title("Short post");
        assert_eq!(title, "Short post");
        assert_eq!(body, "");
    }

    #[test]
    fn test_split_title_320_chars() {
        let text = format!("{}{}", "t".repeat(300), "b".repeat(20));
        let (title, body) = split_title(&text);
        assert_eq!(title.chars().count(), 300);
        assert_eq!(body, "b".repeat(20));
        assert_eq!(format!("{}{}", title, body), text);
    }

    #[test]
    fn test_split_title_respects_char_boundaries() {
        let text = "é".repeat(301);
        let (title, body) = split_title(&text);
        assert_eq!(title.chars().count(), 300);
        assert_eq!(body, "é");
    }

    #[test]
    fn test_submit_errors() {
        let body = json!({"json": {"errors": [["SUBREDDIT_NOEXIST", "that subreddit doesn't exist", "sr"]]}});
        assert_eq!(
            submit_errors(&body),
            vec!["SUBREDDIT_NOEXIST: that subreddit doesn't exist".to_string()]
        );
        assert!(submit_errors(&json!({"json": {"errors": [], "data": {}}})).is_empty());
        assert!(submit_errors(&json!({})).is_empty());
    }

    #[test]
    fn test_subreddit_required() {
        let integration = Integration::new("u", Platform::Reddit, "token");
        assert_eq!(
            adapter().check_credentials(&integration).unwrap_err().code(),
            "missing_credentials"
        );
    }

    #[tokio::test]
    async fn test_expiry_follows_the_callers_clock() {
        let mut integration = Integration::new("u", Platform::Reddit, "token");
        integration.subreddit = Some("rust".to_string());
        integration.expires_at = Some(1_000);

        // Credential checks carry no clock of their own
        assert!(adapter().check_credentials(&integration).is_ok());

        assert_eq!(adapter().refresh_credentials(&integration, 999).await, Ok(None));
        assert_eq!(
            adapter()
                .refresh_credentials(&integration, 1_000)
                .await
                .unwrap_err()
                .code(),
            "token_expired"
        );
    }

    #[tokio::test]
    async fn test_refresh_not_needed_when_fresh() {
        let mut integration = Integration::new("u", Platform::Reddit, "token");
        integration.expires_at = Some(10_000);
        assert_eq!(adapter().refresh_credentials(&integration, 5_000).await, Ok(None));
    }

    #[tokio::test]
    async fn test_refresh_without_client_secret() {
        let mut integration = Integration::new("u", Platform::Reddit, "token");
        integration.expires_at = Some(10);
        integration.secondary_token = Some("refresh".to_string());
        let error = adapter().refresh_credentials(&integration, 20).await.unwrap_err();
        assert_eq!(error.code(), "missing_credentials");
    }
}
