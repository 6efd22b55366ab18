use std::time::Duration;

use tokio::time::Instant;

use crate::session::ControlSignal;

/// How a paced wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    Elapsed,
    Stopped,
}

/// Sleep for `duration` in slices of at most `slice`, checking the stop flag
/// and waiting out any pause between slices.
///
/// Stop is therefore observed within one slice no matter how long the
/// requested wait is. Time spent paused counts towards the wait. A wait too
/// long for the clock to represent only ends on stop.
pub async fn pace(control: &ControlSignal, duration: Duration, slice: Duration) -> Pace {
    let deadline = Instant::now().checked_add(duration);
    let slice = if slice.is_zero() {
        Duration::from_millis(1)
    } else {
        slice
    };

    loop {
        if control.is_stopped() {
            return Pace::Stopped;
        }
        control.wait_unpaused().await;
        if control.is_stopped() {
            return Pace::Stopped;
        }

        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => slice,
        };
        if remaining.is_zero() {
            return Pace::Elapsed;
        }
        tokio::time::sleep(slice.min(remaining)).await;
    }
}
