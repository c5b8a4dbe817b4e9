//! Configuration management for Crosscast
//!
//! Configuration is read once at startup and passed by reference into the
//! adapters. Nothing below `Config::load` reads the process environment.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::Platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default = "default_rate_limits")]
    pub rate_limits: HashMap<Platform, RateLimitConfig>,
    #[serde(default)]
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/crosscast/crosscast.db".to_string(),
        }
    }
}

/// Outbound HTTP settings shared by all adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Ceiling on one whole adapter publish, readiness polling included
    pub publish_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            publish_timeout_secs: 180,
            user_agent: concat!("crosscast/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

/// Readiness polling for two-step (container then publish) platforms
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 3_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between ticks
    pub interval_secs: u64,
    /// Due posts processed per tick
    pub batch_size: u32,
    /// Claims older than this are released for another instance
    pub claim_timeout_secs: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            batch_size: 10,
            claim_timeout_secs: 900,
        }
    }
}

/// Daily call ceilings for a quota-constrained platform
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub app_daily: u32,
    pub user_daily: u32,
}

fn default_rate_limits() -> HashMap<Platform, RateLimitConfig> {
    HashMap::from([(
        Platform::Linkedin,
        RateLimitConfig {
            app_daily: 500,
            user_daily: 100,
        },
    )])
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlatformsConfig {
    pub linkedin: LinkedinConfig,
    pub twitter: TwitterConfig,
    pub facebook: GraphConfig,
    pub instagram: GraphConfig,
    pub threads: ThreadsConfig,
    pub reddit: RedditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkedinConfig {
    pub api_base: String,
}

impl Default for LinkedinConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.linkedin.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    pub api_base: String,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.twitter.com".to_string(),
        }
    }
}

/// Facebook and Instagram both speak the Graph API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub graph_base: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            graph_base: "https://graph.facebook.com/v19.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadsConfig {
    pub graph_base: String,
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            graph_base: "https://graph.threads.net/v1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub api_base: String,
    pub auth_base: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            api_base: "https://oauth.reddit.com".to_string(),
            auth_base: "https://www.reddit.com".to_string(),
            client_id: None,
            client_secret: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file yields the defaults; a file that exists but does not
    /// parse is an error.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default_config()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            rate_limits: default_rate_limits(),
            ..Default::default()
        }
    }

    /// Secrets may come from the environment instead of the file
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("CROSSCAST_REDDIT_CLIENT_ID") {
            self.platforms.reddit.client_id = Some(id);
        }
        if let Ok(secret) = std::env::var("CROSSCAST_REDDIT_CLIENT_SECRET") {
            self.platforms.reddit.client_secret = Some(secret);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()).into());
        }
        if self.scheduler.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.batch_size".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        // One post's dispatch may take a credential refresh plus a full
        // publish; a claim must outlive both or another instance steals it
        let longest_dispatch = self.http.publish_timeout_secs + self.http.timeout_secs;
        if self.scheduler.claim_timeout_secs <= longest_dispatch as i64 {
            return Err(ConfigError::Invalid {
                field: "scheduler.claim_timeout_secs".to_string(),
                reason: format!(
                    "must exceed http.publish_timeout_secs + http.timeout_secs ({}s)",
                    longest_dispatch
                ),
            }
            .into());
        }
        if self.polling.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "polling.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Resolve the configuration file path (XDG config dir unless overridden)
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosscast").join("config.toml"))
}
