//! Boundary operations used by the HTTP and CLI layers.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::delivery::{OutcomeProvider, RetryExecutor, SimulatedOutcome, mask_token};
use crate::session::{
    ControlAction, LogEntry, RegistryError, SessionConfig, SessionKey, SessionMode,
    SessionRegistry, SessionStatus, SessionSummary,
};
use crate::validation::{Limits, SessionRequest, ValidationError, validate};
use crate::worker::{SessionWorker, WorkerSettings};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Session not found: {key}")]
    NotFound { key: String },

    #[error("Invalid action: {action}")]
    InvalidAction { action: String },

    #[error(transparent)]
    Registry(RegistryError),
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::SessionNotFound { key } => Self::NotFound { key },
            other => Self::Registry(other),
        }
    }
}

/// Full view of one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDetails {
    pub key: SessionKey,
    pub status: SessionStatus,
    pub mode: SessionMode,
    pub config: SessionConfig,
    pub logs: Vec<LogEntry>,
}

impl SessionDetails {
    /// Same view with every token masked, for callers outside the process.
    pub fn redacted(mut self) -> Self {
        for token in &mut self.config.tokens {
            *token = mask_token(token);
        }
        self
    }
}

/// Owns the registry and starts a worker for every session it creates.
#[derive(Clone)]
pub struct SessionService {
    registry: Arc<SessionRegistry>,
    executor: RetryExecutor,
    settings: WorkerSettings,
    limits: Limits,
}

impl SessionService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        provider: Arc<dyn OutcomeProvider>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            registry,
            executor: RetryExecutor::new(provider),
            settings: WorkerSettings::from(config),
            limits: Limits::from(config),
        }
    }

    /// Service backed by the simulated upstream, as configured.
    pub fn simulated(config: &EngineConfig) -> Self {
        Self::new(
            Arc::new(SessionRegistry::with_log_capacity(config.log_capacity)),
            Arc::new(SimulatedOutcome::new(config.simulation.clone())),
            config,
        )
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Validate, register and start a session.
    pub fn create_session(&self, request: SessionRequest) -> Result<SessionKey, ServiceError> {
        let (key, _) = self.create_session_with_handle(request)?;
        Ok(key)
    }

    /// Like [`Self::create_session`], also returning the worker handle.
    pub fn create_session_with_handle(
        &self,
        request: SessionRequest,
    ) -> Result<(SessionKey, JoinHandle<()>), ServiceError> {
        let config = validate(request, self.limits)?;
        let key = self.registry.create(config)?;
        let session = self.registry.get(key)?;

        let handle =
            SessionWorker::new(session, self.executor.clone(), self.settings.clone()).spawn();
        Ok((key, handle))
    }

    pub fn get_session_summary(&self, key: &str) -> Result<SessionDetails, ServiceError> {
        let session = self.registry.get(parse_key(key)?)?;
        Ok(SessionDetails {
            key: session.key(),
            status: session.status(),
            mode: session.mode(),
            config: session.config().clone(),
            logs: session.logs().snapshot(),
        })
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, ServiceError> {
        Ok(self.registry.list()?)
    }

    pub fn control_session(&self, key: &str, action: &str) -> Result<SessionStatus, ServiceError> {
        let key = parse_key(key)?;
        let action: ControlAction = action
            .trim()
            .parse()
            .map_err(|_| ServiceError::InvalidAction {
                action: action.to_string(),
            })?;
        Ok(self.registry.apply_control(key, action)?)
    }

    /// Stored log entries as `[timestamp] text` lines.
    pub fn download_logs(&self, key: &str) -> Result<String, ServiceError> {
        let session = self.registry.get(parse_key(key)?)?;
        Ok(session.logs().render())
    }

    pub fn remove_session(&self, key: &str) -> Result<(), ServiceError> {
        Ok(self.registry.remove(parse_key(key)?)?)
    }

    pub fn evict_stopped(&self, ttl: Duration) -> Result<usize, ServiceError> {
        Ok(self.registry.evict_stopped(ttl)?)
    }

    pub fn stop_all(&self) -> Result<usize, ServiceError> {
        Ok(self.registry.stop_all()?)
    }
}

/// Keys that do not parse can never match a session, so they are reported
/// as not found.
fn parse_key(key: &str) -> Result<SessionKey, ServiceError> {
    key.trim().parse().map_err(|_| ServiceError::NotFound {
        key: key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedOutcome;

    fn fast_config() -> EngineConfig {
        EngineConfig {
            check_interval_ms: 5,
            pause_quantum_ms: 5,
            repeat_pause_ms: 5,
            ..EngineConfig::default()
        }
    }

    fn service() -> SessionService {
        SessionService::new(
            Arc::new(SessionRegistry::new()),
            Arc::new(ScriptedOutcome::always_succeed()),
            &fast_config(),
        )
    }

    fn request(mode: SessionMode, tokens: &[&str]) -> SessionRequest {
        SessionRequest {
            mode,
            target: "thread-9".to_string(),
            name: "Bo".to_string(),
            messages: vec!["hi".to_string(), "bye".to_string()],
            tokens: tokens.iter().map(|t| (*t).to_string()).collect(),
            access_token: None,
            proxies: vec![],
            interval_secs: 0.0,
            max_retries: 1,
            retry_delay_secs: 0.0,
            repeat: false,
        }
    }

    #[tokio::test]
    async fn multi_without_tokens_registers_nothing() {
        let service = service();
        let result = service.create_session(request(SessionMode::Multi, &[]));

        assert!(matches!(
            result,
            Err(ServiceError::Validation(ValidationError::NoTokens))
        ));
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn create_then_inspect_and_download() {
        let service = service();
        let (key, handle) = service
            .create_session_with_handle(request(SessionMode::Single, &["tok-12345"]))
            .unwrap();
        handle.await.unwrap();

        let details = service.get_session_summary(&key.to_string()).unwrap();
        assert_eq!(details.status, SessionStatus::Stopped);
        assert_eq!(details.mode, SessionMode::Single);
        assert_eq!(details.config.messages, vec!["hi", "bye"]);

        let text = service.download_logs(&key.to_string()).unwrap();
        assert_eq!(text.lines().count(), details.logs.len());
        assert!(text.lines().all(|line| line.starts_with('[')));
        assert!(text.lines().last().unwrap().ends_with("] worker exited"));

        let redacted = details.redacted();
        assert_eq!(redacted.config.tokens, vec!["****2345"]);

        let listed = service.list_sessions().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, key);
    }

    #[tokio::test]
    async fn control_rejects_unknown_action_and_key() {
        let service = service();
        let mut req = request(SessionMode::Single, &["tok-12345"]);
        req.repeat = true;
        let (key, handle) = service.create_session_with_handle(req).unwrap();
        let key = key.to_string();

        assert!(matches!(
            service.control_session(&key, "explode"),
            Err(ServiceError::InvalidAction { .. })
        ));
        assert!(matches!(
            service.control_session(&SessionKey::new().to_string(), "pause"),
            Err(ServiceError::NotFound { .. })
        ));
        assert!(matches!(
            service.control_session("not-a-key", "pause"),
            Err(ServiceError::NotFound { .. })
        ));

        assert_eq!(
            service.control_session(&key, "stop").unwrap(),
            SessionStatus::Stopping
        );
        handle.await.unwrap();
        assert_eq!(
            service.get_session_summary(&key).unwrap().status,
            SessionStatus::Stopped
        );
    }

    #[tokio::test]
    async fn remove_and_evict_only_touch_stopped_sessions() {
        let service = service();
        let (done, handle) = service
            .create_session_with_handle(request(SessionMode::Single, &["tok-12345"]))
            .unwrap();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let mut looping = request(SessionMode::Single, &["tok-67890"]);
        looping.repeat = true;
        let (live, live_handle) = service.create_session_with_handle(looping).unwrap();

        assert!(matches!(
            service.remove_session(&live.to_string()),
            Err(ServiceError::Registry(RegistryError::SessionStillActive { .. }))
        ));
        assert_eq!(service.evict_stopped(Duration::ZERO).unwrap(), 1);
        assert!(matches!(
            service.get_session_summary(&done.to_string()),
            Err(ServiceError::NotFound { .. })
        ));

        assert_eq!(service.stop_all().unwrap(), 1);
        live_handle.await.unwrap();
        service.remove_session(&live.to_string()).unwrap();
        assert!(service.list_sessions().unwrap().is_empty());
    }
}
