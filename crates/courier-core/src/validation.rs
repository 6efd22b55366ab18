//! Turning raw submissions into validated session configs.
//!
//! Everything here runs before a session exists, so a rejected request never
//! touches the registry.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::session::{SessionConfig, SessionMode};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("target identifier is required")]
    MissingTarget,

    #[error("name prefix is required")]
    MissingName,

    #[error("at least one message is required")]
    NoMessages,

    #[error("too many messages: {count} (limit {limit})")]
    TooManyMessages { count: usize, limit: usize },

    #[error("multi mode requires at least one token")]
    NoTokens,

    #[error("single mode requires a non-empty token")]
    MissingToken,

    #[error("too many tokens: {count} (limit {limit})")]
    TooManyTokens { count: usize, limit: usize },

    #[error("{field} must be a finite number of seconds >= 0")]
    InvalidSeconds { field: &'static str },

    #[error("max_retries must be at least 1")]
    InvalidMaxRetries,
}

/// Size limits applied during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_messages: usize,
    pub max_tokens: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for Limits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_messages: config.max_messages,
            max_tokens: config.max_tokens,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    2.0
}

/// Raw CreateSession input, as received from a form or API call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    #[serde(default)]
    pub mode: SessionMode,
    pub target: String,
    pub name: String,
    pub messages: Vec<String>,
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Single-mode token; takes precedence over `tokens[0]`.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub proxies: Vec<String>,
    pub interval_secs: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f64,
    #[serde(default)]
    pub repeat: bool,
}

/// Split an uploaded message file into messages, skipping blank lines.
pub fn parse_messages(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Split an uploaded token or proxy file: one trimmed entry per non-blank line.
pub fn parse_tokens(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_proxies(text: &str) -> Vec<String> {
    parse_tokens(text)
}

fn seconds(value: f64, field: &'static str) -> Result<Duration, ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::InvalidSeconds { field });
    }
    Duration::try_from_secs_f64(value).map_err(|_| ValidationError::InvalidSeconds { field })
}

/// Check a request against `limits` and build the immutable session config.
pub fn validate(request: SessionRequest, limits: Limits) -> Result<SessionConfig, ValidationError> {
    let target = request.target.trim().to_string();
    if target.is_empty() {
        return Err(ValidationError::MissingTarget);
    }
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(ValidationError::MissingName);
    }

    let messages: Vec<String> = request
        .messages
        .into_iter()
        .filter(|m| !m.trim().is_empty())
        .collect();
    if messages.is_empty() {
        return Err(ValidationError::NoMessages);
    }
    if messages.len() > limits.max_messages {
        return Err(ValidationError::TooManyMessages {
            count: messages.len(),
            limit: limits.max_messages,
        });
    }

    let tokens: Vec<String> = match request.mode {
        SessionMode::Single => {
            let token = request
                .access_token
                .or_else(|| request.tokens.into_iter().next())
                .map(|t| t.trim().to_string())
                .unwrap_or_default();
            if token.is_empty() {
                return Err(ValidationError::MissingToken);
            }
            vec![token]
        }
        SessionMode::Multi => {
            let tokens: Vec<String> = request
                .tokens
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            if tokens.is_empty() {
                return Err(ValidationError::NoTokens);
            }
            if tokens.len() > limits.max_tokens {
                return Err(ValidationError::TooManyTokens {
                    count: tokens.len(),
                    limit: limits.max_tokens,
                });
            }
            tokens
        }
    };

    if request.max_retries == 0 {
        return Err(ValidationError::InvalidMaxRetries);
    }

    let proxies = request
        .proxies
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    Ok(SessionConfig {
        mode: request.mode,
        target,
        name,
        messages,
        tokens,
        proxies,
        interval: seconds(request.interval_secs, "interval_secs")?,
        max_retries: request.max_retries,
        retry_delay: seconds(request.retry_delay_secs, "retry_delay_secs")?,
        repeat: request.repeat,
    })
}
