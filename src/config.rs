//! Relay configuration.
//!
//! Loaded from environment variables, or deserialized from any serde source
//! by the embedding application.
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `MM_SERVER` | `server` | required |
//! | `MM_NO_TLS` | `no_tls` | `false` |
//! | `MM_TOKEN` | `token` | empty |
//! | `MM_TEAM_ID` | `team_id` | empty |
//! | `MM_USER_ID` | `user_id` | empty |
//! | `MM_DEDUP_CAPACITY` | `dedup_capacity` | 5000 |
//! | `MM_RETRY_MAX_ATTEMPTS` | `retry_max_attempts` | unbounded |
//! | `MM_RETRY_FALLBACK_SECS` | `retry_fallback_secs` | none |

use std::env;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::dedup::DEFAULT_DEDUP_CAPACITY;
use crate::retry::RetryConfig;
use crate::types::{TeamId, UserId};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Settings for connecting to one server as one user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelayConfig {
    /// Server host and optional port, without scheme (`chat.example.com:8065`).
    pub server: String,

    /// Use `http` instead of `https` for API calls and constructed file links.
    #[serde(default)]
    pub no_tls: bool,

    #[serde(default)]
    pub token: String,

    /// Team used for searches and direct-channel lookups.
    #[serde(default)]
    pub team_id: TeamId,

    /// The relay's own user, one side of every direct channel it opens.
    #[serde(default)]
    pub user_id: UserId,

    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    #[serde(default)]
    pub retry_max_attempts: Option<u32>,

    #[serde(default)]
    pub retry_fallback_secs: Option<u64>,
}

fn default_dedup_capacity() -> usize {
    DEFAULT_DEDUP_CAPACITY
}

impl RelayConfig {
    pub fn new(server: impl Into<String>) -> Self {
        RelayConfig {
            server: server.into(),
            no_tls: false,
            token: String::new(),
            team_id: TeamId::default(),
            user_id: UserId::default(),
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            retry_max_attempts: None,
            retry_fallback_secs: None,
        }
    }

    /// Loads the configuration from `MM_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let server = lookup("MM_SERVER").ok_or(ConfigError::MissingField("MM_SERVER"))?;
        let mut config = RelayConfig::new(server);

        if let Some(v) = lookup("MM_NO_TLS") {
            config.no_tls = parse_bool("MM_NO_TLS", &v)?;
        }
        if let Some(v) = lookup("MM_TOKEN") {
            config.token = v;
        }
        if let Some(v) = lookup("MM_TEAM_ID") {
            config.team_id = TeamId::new(v);
        }
        if let Some(v) = lookup("MM_USER_ID") {
            config.user_id = UserId::new(v);
        }
        if let Some(v) = lookup("MM_DEDUP_CAPACITY") {
            config.dedup_capacity = parse_number("MM_DEDUP_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("MM_RETRY_MAX_ATTEMPTS") {
            config.retry_max_attempts = Some(parse_number("MM_RETRY_MAX_ATTEMPTS", &v)?);
        }
        if let Some(v) = lookup("MM_RETRY_FALLBACK_SECS") {
            config.retry_fallback_secs = Some(parse_number("MM_RETRY_FALLBACK_SECS", &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.trim().is_empty() {
            return Err(ConfigError::MissingField("server"));
        }
        if self.server.contains("://") {
            return Err(ConfigError::ValidationError(format!(
                "server must be a host without scheme, got {}",
                self.server
            )));
        }
        if self.dedup_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "dedup_capacity must be at least 1".to_string(),
            ));
        }
        if self.retry_max_attempts == Some(0) {
            return Err(ConfigError::ValidationError(
                "retry_max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// URI scheme for API calls and constructed links.
    pub fn scheme(&self) -> &'static str {
        if self.no_tls { "http" } else { "https" }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.retry_max_attempts,
            self.retry_fallback_secs.map(Duration::from_secs),
        )
    }
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field,
        value: value.to_string(),
    })
}
