//! Per-session worker task.
//!
//! A worker walks the session's send plan (tokens outer, messages inner),
//! hands every payload to the [`RetryExecutor`], paces between sends and keeps
//! the session status in step with what it is doing. Pause and stop are
//! observed cooperatively at every send, every pacing slice and every backoff
//! slice.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::delivery::{Payload, RetryExecutor, RetryPolicy, SendOutcome};
use crate::pacing::{Pace, pace};
use crate::session::{Session, SessionMode, SessionStatus};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid session configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Worker panicked: {message}")]
    Panicked { message: String },
}

/// Timing knobs shared by every worker of an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub check_interval: Duration,
    pub pause_quantum: Duration,
    pub repeat_pause: Duration,
    pub backoff_factor: f64,
    pub max_backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for WorkerSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            check_interval: config.check_interval(),
            pause_quantum: config.pause_quantum(),
            repeat_pause: config.repeat_pause(),
            backoff_factor: config.backoff_factor,
            max_backoff: config.max_backoff(),
        }
    }
}

pub struct SessionWorker {
    session: Arc<Session>,
    executor: RetryExecutor,
    settings: WorkerSettings,
}

impl SessionWorker {
    pub fn new(session: Arc<Session>, executor: RetryExecutor, settings: WorkerSettings) -> Self {
        Self {
            session,
            executor,
            settings,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drive the session to completion. Never fails: faults are logged into
    /// the session and end it in `stopped`.
    pub async fn run(self) {
        let session = self.session.clone();
        let key = session.key();
        tracing::info!(session_key = %key, mode = %session.mode(), "Worker started");

        let result = match AssertUnwindSafe(self.drive()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(WorkerError::Panicked {
                message: panic_message(panic.as_ref()),
            }),
        };

        if let Err(err) = result {
            tracing::error!(session_key = %key, error = %err, "Worker failed");
            session.logs().append(format!("worker exception: {err}"));
        }

        session.transition(SessionStatus::Stopped);
        session.logs().append("worker exited");
        tracing::info!(session_key = %key, "Worker exited");
    }

    async fn drive(&self) -> Result<(), WorkerError> {
        let config = self.session.config();
        check_plan(self.session.mode(), &config.tokens, &config.messages)?;

        let control = self.session.control();
        let logs = self.session.logs();
        logs.append(format!(
            "worker started: mode={} tokens={} messages={} interval={:.1}s max_retries={} repeat={}",
            config.mode,
            config.tokens.len(),
            config.messages.len(),
            config.interval.as_secs_f64(),
            config.max_retries,
            config.repeat,
        ));

        let mut pass: u64 = 0;
        loop {
            if control.is_stopped() {
                logs.append("stop requested");
                break;
            }

            if control.is_paused() {
                self.session.transition(SessionStatus::Paused);
                let _ = tokio::time::timeout(self.settings.pause_quantum, control.wait_unpaused())
                    .await;
                continue;
            }

            self.session.mark_active();
            pass += 1;

            if self.run_pass(pass).await == Pace::Stopped {
                logs.append(format!("stop requested during pass {pass}"));
                break;
            }

            if !config.repeat {
                logs.append(format!(
                    "pass {pass} complete: {} sends finished, repeat disabled",
                    config.sends_per_pass()
                ));
                break;
            }

            if pace(control, self.settings.repeat_pause, self.settings.check_interval).await
                == Pace::Stopped
            {
                logs.append("stop requested");
                break;
            }
        }

        Ok(())
    }

    /// One traversal of the plan. Returns `Pace::Stopped` if stop cut it short.
    async fn run_pass(&self, pass: u64) -> Pace {
        let config = self.session.config();
        let control = self.session.control();
        let logs = self.session.logs();
        let policy = RetryPolicy::new(config.max_retries, config.retry_delay)
            .with_backoff(self.settings.backoff_factor, self.settings.max_backoff)
            .with_check_interval(self.settings.check_interval);

        let token_total = config.tokens.len();
        let message_total = config.messages.len();

        for (token_index, token) in config.tokens.iter().enumerate() {
            for (message_index, message) in config.messages.iter().enumerate() {
                if control.is_stopped() {
                    return Pace::Stopped;
                }

                let payload = Payload::compose(&config.target, &config.name, token, message);
                let outcome = self
                    .executor
                    .attempt_send(control, logs, &payload, &config.proxies, &policy)
                    .await;

                let position = format!(
                    "pass {pass} token {}/{token_total} message {}/{message_total}",
                    token_index + 1,
                    message_index + 1,
                );
                match outcome {
                    SendOutcome::Delivered { attempts } => {
                        logs.append(format!("{position}: delivered after {attempts} attempt(s)"));
                    }
                    SendOutcome::Exhausted { attempts } => {
                        logs.append(format!("{position}: failed after {attempts} attempt(s)"));
                    }
                    SendOutcome::Aborted { .. } => {
                        logs.append(format!("{position}: aborted"));
                        return Pace::Stopped;
                    }
                }

                if pace(control, config.interval, self.settings.check_interval).await
                    == Pace::Stopped
                {
                    return Pace::Stopped;
                }
            }
        }

        Pace::Elapsed
    }
}

fn check_plan(mode: SessionMode, tokens: &[String], messages: &[String]) -> Result<(), WorkerError> {
    if messages.is_empty() {
        return Err(WorkerError::InvalidConfig {
            message: "no messages to send".to_string(),
        });
    }
    match (mode, tokens.len()) {
        (_, 0) => Err(WorkerError::InvalidConfig {
            message: "no tokens to send with".to_string(),
        }),
        (SessionMode::Single, n) if n != 1 => Err(WorkerError::InvalidConfig {
            message: format!("single mode expects exactly one token, got {n}"),
        }),
        _ => Ok(()),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ControlAction, SessionRegistry};
    use crate::test_utils::{
        ScriptedOutcome, entries_containing, multi_config, single_config, wait_for_status,
    };

    fn fast_settings() -> WorkerSettings {
        WorkerSettings {
            check_interval: Duration::from_millis(5),
            pause_quantum: Duration::from_millis(5),
            repeat_pause: Duration::from_millis(5),
            backoff_factor: 1.0,
            max_backoff: Duration::from_secs(1),
        }
    }

    fn start(
        registry: &SessionRegistry,
        config: crate::session::SessionConfig,
        provider: Arc<ScriptedOutcome>,
    ) -> (Arc<Session>, JoinHandle<()>) {
        let key = registry.create(config).unwrap();
        let session = registry.get(key).unwrap();
        let worker = SessionWorker::new(
            session.clone(),
            RetryExecutor::new(provider),
            fast_settings(),
        );
        (session, worker.spawn())
    }

    #[tokio::test]
    async fn single_pass_without_repeat_completes_and_stops() {
        let registry = SessionRegistry::new();
        let provider = Arc::new(ScriptedOutcome::always_succeed());
        let (session, handle) = start(&registry, single_config(&["hi", "bye"]), provider.clone());

        handle.await.unwrap();

        assert_eq!(session.status(), SessionStatus::Stopped);
        assert!(session.stopped_at().is_some());
        assert_eq!(entries_containing(session.logs(), "attempt ").len(), 2);
        assert_eq!(entries_containing(session.logs(), "complete").len(), 1);
        assert_eq!(entries_containing(session.logs(), "worker exited").len(), 1);

        let texts: Vec<String> = provider.calls().into_iter().map(|c| c.payload.text).collect();
        assert_eq!(texts, vec!["Ana hi", "Ana bye"]);
    }

    #[tokio::test]
    async fn multi_mode_is_token_major() {
        let registry = SessionRegistry::new();
        let provider = Arc::new(ScriptedOutcome::always_succeed());
        let config = multi_config(&["tok-aaaa1", "tok-bbbb2"], &["m1", "m2", "m3"]);
        let (session, handle) = start(&registry, config, provider.clone());

        handle.await.unwrap();

        let sent: Vec<(String, String)> = provider
            .calls()
            .into_iter()
            .map(|c| (c.payload.token, c.payload.text))
            .collect();
        let expected: Vec<(String, String)> = ["tok-aaaa1", "tok-bbbb2"]
            .iter()
            .flat_map(|t| {
                ["m1", "m2", "m3"]
                    .iter()
                    .map(move |m| ((*t).to_string(), format!("Ana {m}")))
            })
            .collect();
        assert_eq!(sent, expected);
        assert_eq!(entries_containing(session.logs(), ": delivered after").len(), 6);
    }

    #[tokio::test]
    async fn failed_sends_are_logged_and_the_pass_continues() {
        let registry = SessionRegistry::new();
        let provider = Arc::new(ScriptedOutcome::always_fail());
        let mut config = single_config(&["a", "b"]);
        config.max_retries = 2;
        let (session, handle) = start(&registry, config, provider.clone());

        handle.await.unwrap();

        assert_eq!(provider.calls().len(), 4);
        assert_eq!(entries_containing(session.logs(), "failed after 2 attempt(s)").len(), 2);
        assert_eq!(session.status(), SessionStatus::Stopped);
    }

    #[tokio::test]
    async fn stop_during_long_interval_ends_promptly() {
        let registry = SessionRegistry::new();
        let provider = Arc::new(ScriptedOutcome::always_succeed());
        let mut config = single_config(&["a", "b", "c"]);
        config.interval = Duration::from_secs(600);
        let (session, handle) = start(&registry, config, provider.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        session.apply(ControlAction::Stop);

        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status(), SessionStatus::Stopped);
        assert_eq!(provider.calls().len(), 1);
        assert_eq!(entries_containing(session.logs(), "stop requested").len(), 1);
    }

    #[tokio::test]
    async fn huge_interval_keeps_the_worker_alive_until_stopped() {
        let registry = SessionRegistry::new();
        let provider = Arc::new(ScriptedOutcome::always_succeed());
        let mut config = single_config(&["a", "b"]);
        config.interval = Duration::from_secs_f64(1e19);
        let (session, handle) = start(&registry, config, provider.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        assert_eq!(session.status(), SessionStatus::Running);
        assert_eq!(provider.calls().len(), 1);

        session.apply(ControlAction::Stop);
        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status(), SessionStatus::Stopped);
        assert!(entries_containing(session.logs(), "worker exception").is_empty());
        assert_eq!(entries_containing(session.logs(), "stop requested").len(), 1);
    }

    #[tokio::test]
    async fn repeat_runs_until_stopped() {
        let registry = SessionRegistry::new();
        let provider = Arc::new(ScriptedOutcome::always_succeed());
        let mut config = single_config(&["loop"]);
        config.repeat = true;
        let (session, handle) = start(&registry, config, provider.clone());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(provider.calls().len() >= 2);
        assert_eq!(session.status(), SessionStatus::Running);

        session.apply(ControlAction::Stop);
        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status(), SessionStatus::Stopped);
        assert!(entries_containing(session.logs(), "complete").is_empty());
    }

    #[tokio::test]
    async fn pause_holds_position_and_resume_continues() {
        let registry = SessionRegistry::new();
        let provider = Arc::new(ScriptedOutcome::always_succeed());
        let mut config = single_config(&["m1", "m2", "m3", "m4"]);
        config.interval = Duration::from_millis(40);
        let (session, handle) = start(&registry, config, provider.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        session.apply(ControlAction::Pause);
        let sent_at_pause = provider.calls().len();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(provider.calls().len(), sent_at_pause);
        assert_eq!(session.status(), SessionStatus::Paused);

        session.apply(ControlAction::Resume);
        handle.await.unwrap();

        let texts: Vec<String> = provider.calls().into_iter().map(|c| c.payload.text).collect();
        assert_eq!(texts, vec!["Ana m1", "Ana m2", "Ana m3", "Ana m4"]);
    }

    #[tokio::test]
    async fn paused_before_start_reports_paused() {
        let registry = SessionRegistry::new();
        let provider = Arc::new(ScriptedOutcome::always_succeed());
        let key = registry.create(single_config(&["m"])).unwrap();
        let session = registry.get(key).unwrap();
        session.apply(ControlAction::Pause);

        let handle = SessionWorker::new(
            session.clone(),
            RetryExecutor::new(provider.clone()),
            fast_settings(),
        )
        .spawn();

        assert!(wait_for_status(&session, SessionStatus::Paused, Duration::from_millis(200)).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(provider.calls().is_empty());

        session.apply(ControlAction::Stop);
        handle.await.unwrap();
        assert_eq!(session.status(), SessionStatus::Stopped);
    }

    #[tokio::test]
    async fn invalid_plan_is_contained_to_the_session() {
        let registry = SessionRegistry::new();
        let provider = Arc::new(ScriptedOutcome::always_succeed());
        let mut broken = single_config(&["m"]);
        broken.tokens.clear();
        let (broken_session, broken_handle) = start(&registry, broken, provider.clone());
        let (healthy_session, healthy_handle) =
            start(&registry, single_config(&["m"]), provider.clone());

        broken_handle.await.unwrap();
        healthy_handle.await.unwrap();

        assert_eq!(broken_session.status(), SessionStatus::Stopped);
        assert_eq!(
            entries_containing(broken_session.logs(), "worker exception").len(),
            1
        );
        assert_eq!(healthy_session.status(), SessionStatus::Stopped);
        assert_eq!(entries_containing(healthy_session.logs(), "complete").len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        let text: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(text.as_ref()), "boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(owned.as_ref()), "bang");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
