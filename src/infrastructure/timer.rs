use crate::types::constants::{DEFAULT_RECONNECT_FALLBACK, RECONNECT_INTERVALS};
use std::time::Duration;
use tokio::time::sleep;

/// Stepped backoff for socket reconnection
pub struct Timer {
    attempts: u32,
    intervals: Vec<u64>,
}

impl Timer {
    pub fn new(intervals: Vec<u64>) -> Self {
        Self {
            attempts: 0,
            intervals,
        }
    }

    /// Get the next delay duration
    pub fn next_delay(&mut self) -> Duration {
        let delay = self
            .intervals
            .get(self.attempts as usize)
            .or(self.intervals.last())
            .copied()
            .unwrap_or(DEFAULT_RECONNECT_FALLBACK);

        self.attempts += 1;
        Duration::from_millis(delay)
    }

    /// Reset the timer
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Sleep for the next delay
    pub async fn schedule_timeout(&mut self) {
        let delay = self.next_delay();
        sleep(delay).await;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new(RECONNECT_INTERVALS.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_step_then_plateau() {
        let mut timer = Timer::default();
        let delays: Vec<u64> = (0..6).map(|_| timer.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 5000, 10000, 10000, 10000]);

        timer.reset();
        assert_eq!(timer.next_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_empty_intervals_use_fallback() {
        let mut timer = Timer::new(Vec::new());
        assert_eq!(
            timer.next_delay(),
            Duration::from_millis(DEFAULT_RECONNECT_FALLBACK)
        );
    }
}
