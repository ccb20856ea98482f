use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

/// Minimum-spacing throttle for REST calls on one venue connector.
///
/// Calls are spaced at least `min_interval` apart. A rate-limit reply
/// doubles the spacing for the following window, then it decays back.
pub struct RestPacer {
    min_interval: Duration,
    state: Mutex<PacerState>,
}

struct PacerState {
    last_call: Option<Instant>,
    current_interval: Duration,
}

impl RestPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(PacerState {
                last_call: None,
                current_interval: min_interval,
            }),
        }
    }

    /// Wait until the next call slot is free and claim it.
    pub async fn pace(&self) {
        let wait = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let wait = match state.last_call {
                Some(last) => (last + state.current_interval).saturating_duration_since(now),
                None => Duration::ZERO,
            };
            state.last_call = Some(now + wait);
            // Penalty windows apply once, then spacing decays back.
            if state.current_interval > self.min_interval {
                state.current_interval = std::cmp::max(self.min_interval, state.current_interval / 2);
            }
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Double the spacing for the next window after a 429.
    pub async fn penalize(&self) {
        let mut state = self.state.lock().await;
        state.current_interval = state.current_interval.saturating_mul(2);
        warn!(target: "pacer", "rate limited, spacing doubled to {:?}", state.current_interval);
    }

    pub async fn current_interval(&self) -> Duration {
        self.state.lock().await.current_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_penalty_doubles_then_decays() {
        let pacer = RestPacer::new(Duration::from_millis(100));
        pacer.penalize().await;
        assert_eq!(pacer.current_interval().await, Duration::from_millis(200));
        pacer.pace().await;
        assert_eq!(pacer.current_interval().await, Duration::from_millis(100));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_pace_enforces_spacing() {
        let pacer = RestPacer::new(Duration::from_millis(100));
        let start = Instant::now();
        pacer.pace().await;
        pacer.pace().await;
        pacer.pace().await;
        // Two full gaps after the immediate first call.
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
