//! Probability-weighted stand-in for a real upstream.
//!
//! Later attempts succeed more often: the success chance for attempt `i` is
//! `min(base + increment * i, cap)`.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::outcome::{DeliveryResult, OutcomeProvider, Payload};
use crate::config::SimulationConfig;

pub struct SimulatedOutcome {
    config: SimulationConfig,
    rng: Mutex<StdRng>,
}

impl SimulatedOutcome {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic variant for reproducible runs.
    pub fn with_seed(config: SimulationConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn success_probability(&self, attempt: u32) -> f64 {
        let raw = self.config.base + self.config.increment * f64::from(attempt);
        raw.min(self.config.cap).clamp(0.0, 1.0)
    }

    /// Draw latency and outcome together so the lock is never held across an
    /// await.
    fn roll(&self, attempt: u32) -> (Duration, bool) {
        let probability = self.success_probability(attempt);
        let min = self.config.min_latency_ms;
        let max = self.config.max_latency_ms.max(min);

        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let latency = if max > min {
            rng.gen_range(min..=max)
        } else {
            min
        };
        (Duration::from_millis(latency), rng.gen_bool(probability))
    }
}

#[async_trait]
impl OutcomeProvider for SimulatedOutcome {
    async fn deliver(
        &self,
        _payload: &Payload,
        _proxy: Option<&str>,
        attempt: u32,
    ) -> DeliveryResult {
        let (latency, delivered) = self.roll(attempt);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if delivered {
            DeliveryResult::Delivered
        } else {
            DeliveryResult::failed("simulated upstream rejection")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_config() -> SimulationConfig {
        SimulationConfig {
            min_latency_ms: 0,
            max_latency_ms: 0,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn probability_grows_per_attempt_up_to_cap() {
        let sim = SimulatedOutcome::new(instant_config());
        assert!((sim.success_probability(1) - 0.43).abs() < 1e-9);
        assert!((sim.success_probability(2) - 0.61).abs() < 1e-9);
        assert!((sim.success_probability(3) - 0.79).abs() < 1e-9);
        assert!((sim.success_probability(4) - 0.95).abs() < 1e-9);
        assert!((sim.success_probability(40) - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn certain_success_always_delivers() {
        let config = SimulationConfig {
            base: 1.0,
            cap: 1.0,
            ..instant_config()
        };
        let sim = SimulatedOutcome::with_seed(config, 7);
        let payload = Payload::compose("t", "n", "tok", "m");
        for attempt in 1..=20 {
            assert!(sim.deliver(&payload, None, attempt).await.is_delivered());
        }
    }

    #[tokio::test]
    async fn seeded_runs_are_reproducible() {
        let payload = Payload::compose("t", "n", "tok", "m");
        let a = SimulatedOutcome::with_seed(instant_config(), 42);
        let b = SimulatedOutcome::with_seed(instant_config(), 42);

        for attempt in 1..=10 {
            assert_eq!(
                a.deliver(&payload, None, attempt).await,
                b.deliver(&payload, None, attempt).await
            );
        }
    }
}
