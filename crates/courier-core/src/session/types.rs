use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Opaque handle for a session. Generated once at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(Uuid);

impl SessionKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    Running,
    Paused,
    Stopping,
    Stopped,
}

impl SessionStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Stopped` is terminal and `Stopping` may only complete to `Stopped`.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::{Paused, Running, Starting, Stopped, Stopping};

        match (self, next) {
            (Stopped, _) => false,
            (Stopping, Stopped) => true,
            (Stopping, _) => false,
            (_, Starting) => false,
            (Starting | Running | Paused, Running | Paused | Stopping | Stopped) => true,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Stopped)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SessionMode {
    #[default]
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ControlAction {
    Pause,
    Resume,
    Stop,
}

/// Validated, immutable parameters of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub mode: SessionMode,
    pub target: String,
    pub name: String,
    pub messages: Vec<String>,
    /// Exactly one entry in single mode, at least one in multi mode.
    pub tokens: Vec<String>,
    pub proxies: Vec<String>,
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    pub max_retries: u32,
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,
    pub repeat: bool,
}

impl SessionConfig {
    /// Number of sends one full pass performs.
    pub fn sends_per_pass(&self) -> usize {
        self.tokens.len() * self.messages.len()
    }
}

/// Lightweight view returned by `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub key: SessionKey,
    pub status: SessionStatus,
    pub mode: SessionMode,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
