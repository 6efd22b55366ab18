use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;

use super::outcome::{DeliveryResult, OutcomeProvider, Payload};
use crate::pacing::{Pace, pace};
use crate::session::{ControlSignal, LogSink};

/// Retry parameters for one logical send.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt. `1.0`
    /// keeps the delay constant.
    pub backoff_factor: f64,
    pub max_backoff: Duration,
    /// Granularity at which stop and pause are observed while waiting.
    pub check_interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
            backoff_factor: 1.0,
            max_backoff: Duration::from_secs(300),
            check_interval: Duration::from_secs(1),
        }
    }

    pub fn with_backoff(mut self, factor: f64, max_backoff: Duration) -> Self {
        self.backoff_factor = factor;
        self.max_backoff = max_backoff;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Delay to wait after the failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_factor.max(1.0).powi(exponent);
        let secs = self.retry_delay.as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff.max(self.retry_delay))
    }
}

/// How one logical send ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered { attempts: u32 },
    Exhausted { attempts: u32 },
    /// Stop was requested before a delivery succeeded.
    Aborted { attempts: u32 },
}

impl SendOutcome {
    pub fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    pub fn attempts(self) -> u32 {
        match self {
            Self::Delivered { attempts }
            | Self::Exhausted { attempts }
            | Self::Aborted { attempts } => attempts,
        }
    }
}

/// Runs bounded retries for one payload, honoring pause and stop.
///
/// Ordinary delivery failures are logged and retried, never returned as
/// errors.
#[derive(Clone)]
pub struct RetryExecutor {
    provider: Arc<dyn OutcomeProvider>,
}

impl RetryExecutor {
    pub fn new(provider: Arc<dyn OutcomeProvider>) -> Self {
        Self { provider }
    }

    pub async fn attempt_send(
        &self,
        control: &ControlSignal,
        log: &LogSink,
        payload: &Payload,
        proxies: &[String],
        policy: &RetryPolicy,
    ) -> SendOutcome {
        let max = policy.max_retries.max(1);
        let preview = payload.preview();

        for attempt in 1..=max {
            if control.is_stopped() {
                return Self::abort(log, attempt, max);
            }

            control.wait_unpaused().await;
            if control.is_stopped() {
                return Self::abort(log, attempt, max);
            }

            let proxy = choose_proxy(proxies);
            let started = Instant::now();
            let result = self.provider.deliver(payload, proxy, attempt).await;
            let latency = started.elapsed();

            let outcome_text = match &result {
                DeliveryResult::Delivered => "delivered".to_string(),
                DeliveryResult::Failed { reason } => format!("failed: {reason}"),
            };
            log.append(format!(
                "attempt {attempt}/{max} token={} proxy={} payload=\"{preview}\" latency={}ms -> {outcome_text}",
                payload.masked_token(),
                proxy.unwrap_or("none"),
                latency.as_millis(),
            ));

            if result.is_delivered() {
                return SendOutcome::Delivered { attempts: attempt };
            }

            if attempt < max {
                let delay = policy.delay_after(attempt);
                if pace(control, delay, policy.check_interval).await == Pace::Stopped {
                    return Self::abort(log, attempt + 1, max);
                }
            }
        }

        log.append(format!(
            "exhausted {max} attempts without delivery for payload \"{preview}\""
        ));
        SendOutcome::Exhausted { attempts: max }
    }

    fn abort(log: &LogSink, attempt: u32, max: u32) -> SendOutcome {
        log.append(format!("attempt {attempt}/{max} aborted: stop requested"));
        SendOutcome::Aborted {
            attempts: attempt - 1,
        }
    }
}

/// Uniform choice among the configured proxies, `None` when there are none.
fn choose_proxy(proxies: &[String]) -> Option<&str> {
    proxies
        .choose(&mut rand::thread_rng())
        .map(String::as_str)
}
