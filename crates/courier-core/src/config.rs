use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::DEFAULT_LOG_CAPACITY;
use crate::utils::paths::AppPaths;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Defaults,
    File(PathBuf),
    /// A discovered file failed to load; defaults are in use.
    Rejected { path: PathBuf, reason: String },
}

impl ConfigSource {
    /// Log the outcome of config discovery.
    pub fn report(&self) {
        match self {
            Self::Defaults => tracing::debug!("No config file found, using defaults"),
            Self::File(path) => tracing::debug!(path = %path.display(), "Loaded engine config"),
            Self::Rejected { path, reason } => tracing::warn!(
                "Failed to load config file at {:?}: {}. Using defaults.",
                path,
                reason
            ),
        }
    }
}

/// Engine-wide settings. Every field may be omitted from the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub log_capacity: usize,
    pub max_messages: usize,
    pub max_tokens: usize,

    /// Slice length for pacing and backoff waits; bounds how long a stop or
    /// pause request can go unnoticed.
    pub check_interval_ms: u64,
    pub pause_quantum_ms: u64,
    pub repeat_pause_ms: u64,

    pub backoff_factor: f64,
    pub max_backoff_secs: u64,

    /// Stopped sessions older than this are evicted. `None` keeps them.
    pub stopped_retention_secs: Option<u64>,

    pub simulation: SimulationConfig,
    pub server: ServerConfig,

    pub submissions_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
            max_messages: 1000,
            max_tokens: 500,
            check_interval_ms: 1000,
            pause_quantum_ms: 1000,
            repeat_pause_ms: 300,
            backoff_factor: 1.0,
            max_backoff_secs: 300,
            stopped_retention_secs: None,
            simulation: SimulationConfig::default(),
            server: ServerConfig::default(),
            submissions_dir: PathBuf::from("submissions"),
            log_dir: None,
        }
    }
}

/// Parameters of the simulated upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub base: f64,
    pub increment: f64,
    pub cap: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            base: 0.25,
            increment: 0.18,
            cap: 0.95,
            min_latency_ms: 50,
            max_latency_ms: 400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5000,
            request_timeout_secs: 30,
        }
    }
}

impl EngineConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn pause_quantum(&self) -> Duration {
        Duration::from_millis(self.pause_quantum_ms)
    }

    pub fn repeat_pause(&self) -> Duration {
        Duration::from_millis(self.repeat_pause_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn stopped_retention(&self) -> Option<Duration> {
        self.stopped_retention_secs.map(Duration::from_secs)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Load from an explicit path, or the first discovered config file.
    ///
    /// An explicit path must exist and parse. A discovered file that fails to
    /// parse is skipped and defaults are used; the returned [`ConfigSource`]
    /// records this so it can be logged once tracing is up.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, ConfigSource), ConfigError> {
        Self::load_from(explicit, AppPaths::discover_configs())
    }

    fn load_from(
        explicit: Option<&Path>,
        candidates: impl IntoIterator<Item = PathBuf>,
    ) -> Result<(Self, ConfigSource), ConfigError> {
        if let Some(path) = explicit {
            let config = Self::from_file(path)?;
            return Ok((config, ConfigSource::File(path.to_path_buf())));
        }

        for path in candidates {
            if !path.exists() {
                continue;
            }
            return Ok(match Self::from_file(&path) {
                Ok(config) => (config, ConfigSource::File(path)),
                Err(e) => (
                    Self::default(),
                    ConfigSource::Rejected {
                        path,
                        reason: e.to_string(),
                    },
                ),
            });
        }

        Ok((Self::default(), ConfigSource::Defaults))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_capacity == 0 {
            return Err(ConfigError::invalid("log_capacity must be > 0"));
        }
        if self.check_interval_ms == 0 {
            return Err(ConfigError::invalid("check_interval_ms must be > 0"));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigError::invalid("backoff_factor must be >= 1.0"));
        }

        let sim = &self.simulation;
        if !(sim.cap > 0.0 && sim.cap <= 1.0) {
            return Err(ConfigError::invalid("simulation.cap must be in (0, 1]"));
        }
        if !sim.base.is_finite() || !sim.increment.is_finite() || sim.base < 0.0 || sim.increment < 0.0
        {
            return Err(ConfigError::invalid(
                "simulation.base and simulation.increment must be finite and >= 0",
            ));
        }
        if sim.min_latency_ms > sim.max_latency_ms {
            return Err(ConfigError::invalid(
                "simulation.min_latency_ms must not exceed max_latency_ms",
            ));
        }
        Ok(())
    }
}
