//! Core types for Crosscast

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::PlatformError;

/// Supported social networks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linkedin,
    Facebook,
    Twitter,
    Threads,
    Reddit,
    Instagram,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Linkedin,
        Platform::Facebook,
        Platform::Twitter,
        Platform::Threads,
        Platform::Reddit,
        Platform::Instagram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linkedin => "linkedin",
            Platform::Facebook => "facebook",
            Platform::Twitter => "twitter",
            Platform::Threads => "threads",
            Platform::Reddit => "reddit",
            Platform::Instagram => "instagram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linkedin" => Ok(Platform::Linkedin),
            "facebook" => Ok(Platform::Facebook),
            "twitter" | "x" => Ok(Platform::Twitter),
            "threads" => Ok(Platform::Threads),
            "reddit" => Ok(Platform::Reddit),
            "instagram" => Ok(Platform::Instagram),
            other => Err(format!(
                "Unknown platform '{}'. Valid options: linkedin, facebook, twitter, threads, reddit, instagram",
                other
            )),
        }
    }
}

/// Parse a comma-separated platform list such as "twitter,reddit"
pub fn parse_platform_list(input: &str) -> Result<Vec<Platform>, String> {
    let mut platforms = Vec::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let platform: Platform = part.parse()?;
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    Ok(platforms)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Connections,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Connections => "connections",
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "connections" => Ok(Visibility::Connections),
            other => Err(format!(
                "Invalid visibility: '{}'. Valid options: public, connections",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }

    /// Published and failed posts are never mutated again
    pub fn is_terminal(&self) -> bool {
        matches!(self, PostStatus::Published | PostStatus::Failed)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(format!("Invalid post status: '{}'", other)),
        }
    }
}

/// Stored OAuth credential set binding one user to one platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Integration {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    /// Member id, Instagram business user id, Threads user id, ...
    pub external_id: Option<String>,
    pub username: Option<String>,
    pub access_token: String,
    /// Refresh token (Reddit) or OAuth1 token secret
    pub secondary_token: Option<String>,
    pub expires_at: Option<i64>,
    pub page_id: Option<String>,
    pub page_token: Option<String>,
    pub subreddit: Option<String>,
    pub active: bool,
    pub last_used_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Integration {
    pub fn new(user_id: &str, platform: Platform, access_token: &str) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            platform,
            external_id: None,
            username: None,
            access_token: access_token.to_string(),
            secondary_token: None,
            expires_at: None,
            page_id: None,
            page_token: None,
            subreddit: None,
            active: true,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub visibility: Visibility,
    pub status: PostStatus,
    pub media_url: Option<String>,
    /// Target platforms; after publishing, the platforms that succeeded
    pub platforms: Vec<Platform>,
    pub scheduled_at: Option<i64>,
    pub published_at: Option<i64>,
    pub created_at: i64,
    /// Summary of the failure reasons for failed posts
    pub error: Option<String>,
}

impl Post {
    pub fn new(user_id: &str, content: String, status: PostStatus) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            content,
            visibility: Visibility::Public,
            status,
            media_url: None,
            platforms: Vec::new(),
            scheduled_at: None,
            published_at: None,
            created_at: chrono::Utc::now().timestamp(),
            error: None,
        }
    }
}

/// Outcome of one platform attempt for a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostRecord {
    pub id: Option<i64>,
    pub post_id: String,
    pub platform: Platform,
    pub platform_post_id: Option<String>,
    pub url: Option<String>,
    pub success: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub attempted_at: i64,
}

impl PostRecord {
    pub fn succeeded(post_id: &str, target: &PublishedTarget, attempted_at: i64) -> Self {
        Self {
            id: None,
            post_id: post_id.to_string(),
            platform: target.platform,
            platform_post_id: Some(target.id.clone()),
            url: Some(target.url.clone()),
            success: true,
            error_code: None,
            error_message: None,
            attempted_at,
        }
    }

    pub fn failed(post_id: &str, target: &FailedTarget, attempted_at: i64) -> Self {
        Self {
            id: None,
            post_id: post_id.to_string(),
            platform: target.platform,
            platform_post_id: None,
            url: None,
            success: false,
            error_code: Some(target.code.clone()),
            error_message: Some(target.message.clone()),
            attempted_at,
        }
    }
}

/// What gets published: the uniform input to every adapter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PublishContent {
    pub text: String,
    pub visibility: Visibility,
    pub media_url: Option<String>,
}

impl PublishContent {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }
}

/// Normalized adapter success
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Published {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishedTarget {
    pub platform: Platform,
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedTarget {
    pub platform: Platform,
    pub code: String,
    pub message: String,
}

impl FailedTarget {
    pub fn new(platform: Platform, error: &PlatformError) -> Self {
        Self {
            platform,
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// One page offered by the Facebook account/page picker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageOption {
    pub id: String,
    pub name: String,
    pub access_token: String,
}

/// Short-lived, user-scoped OAuth intermediate state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingSelection {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub user_token: String,
    pub options: Vec<PageOption>,
    pub created_at: i64,
    pub expires_at: i64,
}

impl PendingSelection {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trips_through_str() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
    }

    #[test]
    fn test_platform_parse_accepts_x_alias_and_case() {
        assert_eq!("X".parse::<Platform>().unwrap(), Platform::Twitter);
        assert_eq!(" LinkedIn ".parse::<Platform>().unwrap(), Platform::Linkedin);
        assert!("mastodon".parse::<Platform>().is_err());
    }

    #[test]
    fn test_parse_platform_list_dedupes() {
        let platforms = parse_platform_list("twitter, reddit,twitter,").unwrap();
        assert_eq!(platforms, vec![Platform::Twitter, Platform::Reddit]);
        assert!(parse_platform_list("").unwrap().is_empty());
        assert!(parse_platform_list("twitter,myspace").is_err());
    }

    #[test]
    fn test_platform_serde_is_lowercase() {
        let json = serde_json::to_string(&vec![Platform::Linkedin, Platform::Instagram]).unwrap();
        assert_eq!(json, r#"["linkedin","instagram"]"#);
    }

    #[test]
    fn test_post_status_terminal() {
        assert!(PostStatus::Published.is_terminal());
        assert!(PostStatus::Failed.is_terminal());
        assert!(!PostStatus::Scheduled.is_terminal());
        assert!(!PostStatus::Draft.is_terminal());
    }

    #[test]
    fn test_post_new_uuid_generation() {
        let post = Post::new("user-1", "Test content".to_string(), PostStatus::Draft);
        let uuid = Uuid::parse_str(&post.id).expect("Post ID should be a valid UUID");
        assert_eq!(uuid.get_version(), Some(uuid::Version::Random));
        assert_eq!(post.visibility, Visibility::Public);
    }

    #[test]
    fn test_integration_expiry() {
        let mut integration = Integration::new("user-1", Platform::Reddit, "token");
        assert!(!integration.is_expired(1_000));

        integration.expires_at = Some(1_000);
        assert!(integration.is_expired(1_000));
        assert!(!integration.is_expired(999));
    }

    #[test]
    fn test_failed_target_from_error() {
        let failed = FailedTarget::new(
            Platform::Linkedin,
            &PlatformError::RateLimited("daily quota".to_string()),
        );
        assert_eq!(failed.code, "rate_limited");
        assert!(failed.message.contains("daily quota"));
    }
}
