use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Pause and stop flags shared between a worker and the control surface.
///
/// The signal only carries state. Whoever observes a flag is responsible for
/// logging it.
#[derive(Debug, Default)]
pub struct ControlSignal {
    pause: AtomicBool,
    stop: AtomicBool,
    changed: Notify,
}

impl ControlSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    pub fn resume(&self) {
        self.pause.store(false, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    /// Request cancellation. There is no way back; a restarted session gets a
    /// fresh signal.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Block while paused. Returns as soon as the pause flag is cleared or
    /// stop is requested, and immediately when neither applies.
    pub async fn wait_unpaused(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before checking so a flag flip between the check and
            // the await still wakes us.
            notified.as_mut().enable();

            if !self.is_paused() || self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn flags_are_independent() {
        let signal = ControlSignal::new();
        assert!(!signal.is_paused());
        assert!(!signal.is_stopped());

        signal.pause();
        assert!(signal.is_paused());
        assert!(!signal.is_stopped());

        signal.stop();
        signal.resume();
        assert!(!signal.is_paused());
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_not_paused() {
        let signal = ControlSignal::new();
        tokio::time::timeout(Duration::from_millis(50), signal.wait_unpaused())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_blocks_until_resumed() {
        let signal = Arc::new(ControlSignal::new());
        signal.pause();

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait_unpaused().await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        signal.resume();
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn stop_releases_paused_waiter() {
        let signal = Arc::new(ControlSignal::new());
        signal.pause();

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait_unpaused().await })
        };

        signal.stop();
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(signal.is_paused());
    }
}
