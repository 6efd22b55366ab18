//! In-memory registry of sessions.
//!
//! The registry lock guards only the key map. Each session synchronizes its
//! own status, control flags and log, so inspecting one session never blocks
//! another session's worker.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::control::ControlSignal;
use super::log::{DEFAULT_LOG_CAPACITY, LogSink};
use super::types::{
    ControlAction, SessionConfig, SessionKey, SessionMode, SessionStatus, SessionSummary,
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Session not found: {key}")]
    SessionNotFound { key: String },

    #[error("Session is still active: {key} ({status})")]
    SessionStillActive { key: String, status: SessionStatus },

    #[error("Registry lock poisoned: {message}")]
    LockPoisoned { message: String },
}

impl RegistryError {
    pub fn not_found(key: SessionKey) -> Self {
        Self::SessionNotFound {
            key: key.to_string(),
        }
    }

    pub fn lock_poisoned(message: impl Into<String>) -> Self {
        Self::LockPoisoned {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StatusCell {
    status: SessionStatus,
    stopped_at: Option<DateTime<Utc>>,
}

/// One registered job: immutable config plus its own control, log and status.
#[derive(Debug)]
pub struct Session {
    key: SessionKey,
    config: SessionConfig,
    created_at: DateTime<Utc>,
    control: ControlSignal,
    logs: LogSink,
    status: RwLock<StatusCell>,
}

impl Session {
    fn new(key: SessionKey, config: SessionConfig, log_capacity: usize) -> Self {
        Self {
            key,
            config,
            created_at: Utc::now(),
            control: ControlSignal::new(),
            logs: LogSink::new(log_capacity),
            status: RwLock::new(StatusCell {
                status: SessionStatus::Starting,
                stopped_at: None,
            }),
        }
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn mode(&self) -> SessionMode {
        self.config.mode
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn control(&self) -> &ControlSignal {
        &self.control
    }

    pub fn logs(&self) -> &LogSink {
        &self.logs
    }

    pub fn status(&self) -> SessionStatus {
        self.read_cell().status
    }

    pub fn stopped_at(&self) -> Option<DateTime<Utc>> {
        self.read_cell().stopped_at
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            key: self.key,
            status: self.status(),
            mode: self.config.mode,
        }
    }

    /// Move to `next` if the lifecycle allows it. Returns the status after
    /// the call, which is unchanged when the transition was refused.
    pub fn transition(&self, next: SessionStatus) -> SessionStatus {
        let mut cell = self.write_cell();
        self.transition_locked(&mut cell, next)
    }

    /// Record that the worker is making progress: `running`, or `paused` if a
    /// pause request is pending.
    ///
    /// The pause flag is read under the status lock, so a concurrent pause
    /// can never be overwritten with `running`.
    pub fn mark_active(&self) -> SessionStatus {
        let mut cell = self.write_cell();
        let next = if self.control.is_paused() {
            SessionStatus::Paused
        } else {
            SessionStatus::Running
        };
        self.transition_locked(&mut cell, next)
    }

    fn transition_locked(&self, cell: &mut StatusCell, next: SessionStatus) -> SessionStatus {
        if cell.status == next || !cell.status.can_transition_to(next) {
            return cell.status;
        }

        tracing::debug!(
            session_key = %self.key,
            from = %cell.status,
            to = %next,
            "Session status change"
        );
        cell.status = next;
        if next == SessionStatus::Stopped {
            cell.stopped_at = Some(Utc::now());
        }
        cell.status
    }

    /// Flip the control flags for `action` and record the matching status.
    ///
    /// Both happen under the status lock, so concurrent actions leave the
    /// pause flag and the status in agreement.
    pub fn apply(&self, action: ControlAction) -> SessionStatus {
        let mut cell = self.write_cell();
        let next = match action {
            ControlAction::Pause => {
                self.control.pause();
                SessionStatus::Paused
            }
            ControlAction::Resume => {
                self.control.resume();
                SessionStatus::Running
            }
            ControlAction::Stop => {
                self.control.stop();
                SessionStatus::Stopping
            }
        };
        self.transition_locked(&mut cell, next)
    }

    fn write_cell(&self) -> std::sync::RwLockWriteGuard<'_, StatusCell> {
        self.status
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn read_cell(&self) -> StatusCell {
        *self
            .status
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<SessionKey, Arc<Session>>,
    /// Keys in creation order.
    order: Vec<SessionKey>,
}

pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
    log_capacity: usize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_log_capacity(log_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            log_capacity,
        }
    }

    /// Register a session in `starting` status. Starting its worker is a
    /// separate step.
    pub fn create(&self, config: SessionConfig) -> Result<SessionKey, RegistryError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| RegistryError::lock_poisoned("sessions"))?;

        let mut key = SessionKey::new();
        while inner.sessions.contains_key(&key) {
            key = SessionKey::new();
        }

        let session = Arc::new(Session::new(key, config, self.log_capacity));
        inner.sessions.insert(key, session);
        inner.order.push(key);

        tracing::info!(session_key = %key, "Registered session");
        Ok(key)
    }

    pub fn get(&self, key: SessionKey) -> Result<Arc<Session>, RegistryError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| RegistryError::lock_poisoned("sessions"))?;
        inner
            .sessions
            .get(&key)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(key))
    }

    /// Summaries of every registered session, oldest first.
    pub fn list(&self) -> Result<Vec<SessionSummary>, RegistryError> {
        let sessions: Vec<Arc<Session>> = {
            let inner = self
                .inner
                .read()
                .map_err(|_| RegistryError::lock_poisoned("sessions"))?;
            inner
                .order
                .iter()
                .filter_map(|key| inner.sessions.get(key).cloned())
                .collect()
        };

        Ok(sessions.iter().map(|session| session.summary()).collect())
    }

    pub fn apply_control(
        &self,
        key: SessionKey,
        action: ControlAction,
    ) -> Result<SessionStatus, RegistryError> {
        let session = self.get(key)?;
        let status = session.apply(action);
        tracing::info!(
            session_key = %key,
            action = %action,
            status = %status,
            "Applied control action"
        );
        Ok(status)
    }

    /// Drop a stopped session. Sessions that are still live are refused.
    pub fn remove(&self, key: SessionKey) -> Result<(), RegistryError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| RegistryError::lock_poisoned("sessions"))?;

        let status = inner
            .sessions
            .get(&key)
            .map(|session| session.status())
            .ok_or_else(|| RegistryError::not_found(key))?;
        if !status.is_terminal() {
            return Err(RegistryError::SessionStillActive {
                key: key.to_string(),
                status,
            });
        }

        inner.sessions.remove(&key);
        inner.order.retain(|k| *k != key);
        tracing::debug!(session_key = %key, "Removed session");
        Ok(())
    }

    /// Remove sessions that have been stopped for longer than `ttl`.
    ///
    /// Returns the number of sessions evicted.
    pub fn evict_stopped(&self, ttl: Duration) -> Result<usize, RegistryError> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::TimeDelta::MAX);
        let now = Utc::now();

        let mut inner = self
            .inner
            .write()
            .map_err(|_| RegistryError::lock_poisoned("sessions"))?;

        let expired: Vec<SessionKey> = inner
            .sessions
            .iter()
            .filter(|(_, session)| {
                session
                    .stopped_at()
                    .is_some_and(|stopped_at| now - stopped_at > ttl)
            })
            .map(|(key, _)| *key)
            .collect();

        for key in &expired {
            inner.sessions.remove(key);
            tracing::debug!(session_key = %key, "Evicted stopped session");
        }
        inner.order.retain(|key| !expired.contains(key));

        Ok(expired.len())
    }

    /// Request stop on every session that has not finished yet.
    pub fn stop_all(&self) -> Result<usize, RegistryError> {
        let sessions: Vec<Arc<Session>> = {
            let inner = self
                .inner
                .read()
                .map_err(|_| RegistryError::lock_poisoned("sessions"))?;
            inner.sessions.values().cloned().collect()
        };

        let mut stopped = 0;
        for session in sessions {
            if !session.status().is_terminal() {
                session.apply(ControlAction::Stop);
                stopped += 1;
            }
        }
        Ok(stopped)
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .map(|inner| inner.sessions.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
