//! Deterministic collaborators shared by unit and integration tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::delivery::{DeliveryResult, OutcomeProvider, Payload};
use crate::session::{LogSink, Session, SessionConfig, SessionMode, SessionStatus};

/// A delivery attempt as seen by [`ScriptedOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub payload: Payload,
    pub proxy: Option<String>,
    pub attempt: u32,
}

/// Outcome provider that plays back a fixed script of results and records
/// every call. Once the script runs out the last result repeats.
pub struct ScriptedOutcome {
    script: Mutex<VecDeque<bool>>,
    fallback: Mutex<bool>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Duration,
}

impl ScriptedOutcome {
    pub fn from_script(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: Mutex::new(true),
            calls: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    pub fn always_succeed() -> Self {
        Self::from_script([true])
    }

    pub fn always_fail() -> Self {
        Self::from_script([false])
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn next_result(&self) -> bool {
        let mut script = self
            .script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut fallback = self
            .fallback
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match script.pop_front() {
            Some(result) => {
                *fallback = result;
                result
            }
            None => *fallback,
        }
    }
}

#[async_trait]
impl OutcomeProvider for ScriptedOutcome {
    async fn deliver(&self, payload: &Payload, proxy: Option<&str>, attempt: u32) -> DeliveryResult {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(RecordedCall {
                payload: payload.clone(),
                proxy: proxy.map(str::to_string),
                attempt,
            });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.next_result() {
            DeliveryResult::Delivered
        } else {
            DeliveryResult::failed("scripted failure")
        }
    }
}

/// Single-mode config with millisecond-scale timing.
pub fn single_config(messages: &[&str]) -> SessionConfig {
    SessionConfig {
        mode: SessionMode::Single,
        target: "thread-100".to_string(),
        name: "Ana".to_string(),
        messages: messages.iter().map(|m| (*m).to_string()).collect(),
        tokens: vec!["token-single-0001".to_string()],
        proxies: Vec::new(),
        interval: Duration::ZERO,
        max_retries: 1,
        retry_delay: Duration::ZERO,
        repeat: false,
    }
}

/// Multi-mode config over `tokens` × `messages`.
pub fn multi_config(tokens: &[&str], messages: &[&str]) -> SessionConfig {
    SessionConfig {
        mode: SessionMode::Multi,
        tokens: tokens.iter().map(|t| (*t).to_string()).collect(),
        ..single_config(messages)
    }
}

/// Texts of log entries containing `needle`, in stored order.
pub fn entries_containing(log: &LogSink, needle: &str) -> Vec<String> {
    log.snapshot()
        .into_iter()
        .map(|entry| entry.text)
        .filter(|text| text.contains(needle))
        .collect()
}

/// Poll until the session reports `status` or `timeout` passes.
pub async fn wait_for_status(session: &Session, status: SessionStatus, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if session.status() == status {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
