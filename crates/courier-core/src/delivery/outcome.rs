use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const PREVIEW_CHARS: usize = 40;

/// One message bound to the token and target it is sent with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub target: String,
    pub token: String,
    pub text: String,
}

impl Payload {
    /// Prefix `message` with `name` and bind it to `token` and `target`.
    pub fn compose(target: &str, name: &str, token: &str, message: &str) -> Self {
        let name = name.trim();
        let text = if name.is_empty() {
            message.to_string()
        } else {
            format!("{name} {message}")
        };

        Self {
            target: target.to_string(),
            token: token.to_string(),
            text,
        }
    }

    /// First characters of the text, for log lines.
    pub fn preview(&self) -> String {
        let mut chars = self.text.chars();
        let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }

    pub fn masked_token(&self) -> String {
        mask_token(&self.token)
    }
}

/// Hide all but the last four characters of a credential.
pub fn mask_token(token: &str) -> String {
    let count = token.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let tail: String = token.chars().skip(count - 4).collect();
    format!("****{tail}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    Failed { reason: String },
}

impl DeliveryResult {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Decides how a single delivery attempt turns out.
///
/// The retry loop owns pacing, logging and cancellation; a provider only
/// performs (or simulates) one attempt.
#[async_trait]
pub trait OutcomeProvider: Send + Sync {
    async fn deliver(&self, payload: &Payload, proxy: Option<&str>, attempt: u32)
    -> DeliveryResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_prefixes_name() {
        let payload = Payload::compose("t-1", "Ana", "tok", "hello");
        assert_eq!(payload.text, "Ana hello");
        assert_eq!(payload.target, "t-1");
        assert_eq!(payload.token, "tok");
    }

    #[test]
    fn compose_without_name_keeps_message() {
        let payload = Payload::compose("t-1", "  ", "tok", "hello");
        assert_eq!(payload.text, "hello");
    }

    #[test]
    fn preview_truncates_long_text() {
        let payload = Payload::compose("t", "", "tok", &"x".repeat(100));
        let preview = payload.preview();
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));

        let short = Payload::compose("t", "", "tok", "short");
        assert_eq!(short.preview(), "short");
    }

    #[test]
    fn mask_token_hides_prefix() {
        assert_eq!(mask_token("EAAB1234abcd"), "****abcd");
        assert_eq!(mask_token("abc"), "****");
        assert_eq!(mask_token(""), "****");
    }
}
