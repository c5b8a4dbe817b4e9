//! HTTP plumbing shared by the adapters
//!
//! One `reqwest::Client` is built from `[http]` config and cloned into every
//! adapter. [`send_json`] turns a request into either the parsed JSON body
//! or a [`PlatformError`] from the common taxonomy.

use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::config::HttpConfig;
use crate::error::{ConfigError, PlatformError, PlatformResult, Result};
use crate::types::Platform;

/// Longest slice of a raw error body carried into a message
const MAX_ERROR_BODY: usize = 300;

pub fn build_client(config: &HttpConfig) -> Result<Client> {
    let client = Client::builder()
        .timeout(config.timeout())
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| ConfigError::Invalid {
            field: "http".to_string(),
            reason: e.to_string(),
        })?;
    Ok(client)
}

/// A successful response: headers plus the JSON body (`Null` when empty)
#[derive(Debug)]
pub struct JsonResponse {
    pub headers: HeaderMap,
    pub body: Value,
}

/// Send a request and decode a JSON response
pub async fn send_json(platform: Platform, request: RequestBuilder) -> PlatformResult<JsonResponse> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(platform, e))?;

    let status = response.status();
    let headers = response.headers().clone();
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(platform, e))?;

    if !status.is_success() {
        let message = extract_error_message(&text)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        tracing::debug!(%platform, status = status.as_u16(), %message, "Platform rejected request");
        return Err(PlatformError::rejected(status.as_u16(), message));
    }

    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).map_err(|e| PlatformError::PlatformRejected {
            status: Some(status.as_u16()),
            message: format!("{} returned a body that is not JSON: {}", platform, e),
        })?
    };

    Ok(JsonResponse { headers, body })
}

fn transport_error(platform: Platform, error: reqwest::Error) -> PlatformError {
    if error.is_timeout() {
        PlatformError::NetworkTimeout(format!("{} did not respond in time", platform))
    } else {
        PlatformError::Network(format!("{}: {}", platform, error))
    }
}

/// Pull a human-readable message out of the error body shapes the six
/// platforms use; falls back to a truncated copy of the raw body
pub fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let json: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(_) => return Some(trimmed.chars().take(MAX_ERROR_BODY).collect()),
    };

    let candidates = [
        // Graph API (Facebook, Instagram, Threads)
        json.pointer("/error/message"),
        // Reddit OAuth
        json.get("error_description"),
        // Twitter v2 problem details
        json.get("detail"),
        // LinkedIn
        json.get("message"),
        json.pointer("/errors/0/message"),
        json.get("title"),
        json.get("error"),
    ];

    let message = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string));
    message.or_else(|| Some(trimmed.chars().take(MAX_ERROR_BODY).collect()))
}

/// Read a string (or number) field as a string id
pub fn string_at(body: &Value, pointer: &str) -> Option<String> {
    match body.pointer(pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Error for a 2xx response missing the field we need
pub fn missing_field(platform: Platform, field: &str) -> PlatformError {
    PlatformError::PlatformRejected {
        status: None,
        message: format!("{} response did not include {}", platform, field),
    }
}
