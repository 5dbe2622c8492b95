use crate::config::FrequencyConfig;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Detects rapid repeated actuation of the motor.
///
/// Keeps the last `capacity` actuation times; operation is frequent once the
/// history is full and its oldest entry is younger than the window.
#[derive(Debug, Clone)]
pub struct FrequencyGuard {
    history: VecDeque<Instant>,
    capacity: usize,
    window: Duration,
}

impl FrequencyGuard {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            window,
        }
    }

    pub fn from_config(config: &FrequencyConfig) -> Self {
        Self::new(config.capacity, config.window())
    }

    pub fn record_actuation(&mut self, now: Instant) {
        if self.capacity == 0 {
            return;
        }
        while self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(now);
    }

    pub fn is_frequent(&self, now: Instant, window: Duration) -> bool {
        if self.capacity == 0 || self.history.len() < self.capacity {
            return false;
        }
        match self.history.front() {
            Some(oldest) => now.saturating_duration_since(*oldest) < window,
            None => false,
        }
    }

    /// `is_frequent` against the configured window
    pub fn is_frequent_now(&self, now: Instant) -> bool {
        self.is_frequent(now, self.window)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_full_history_inside_window_is_frequent() {
        let t0 = Instant::now();
        let mut guard = FrequencyGuard::new(3, ms(20_000));

        for offset in [0, 5_000, 15_000] {
            guard.record_actuation(t0 + ms(offset));
        }

        assert!(guard.is_frequent(t0 + ms(15_000), ms(20_000)));
    }

    #[test]
    fn test_full_history_outside_window_is_not_frequent() {
        let t0 = Instant::now();
        let mut guard = FrequencyGuard::new(3, ms(20_000));

        for offset in [0, 5_000, 25_000] {
            guard.record_actuation(t0 + ms(offset));
        }

        assert!(!guard.is_frequent(t0 + ms(25_000), ms(20_000)));
    }

    #[test]
    fn test_partial_history_is_never_frequent() {
        let t0 = Instant::now();
        let mut guard = FrequencyGuard::new(3, ms(20_000));

        guard.record_actuation(t0);
        guard.record_actuation(t0 + ms(1));

        assert!(!guard.is_frequent_now(t0 + ms(2)));
    }

    #[test]
    fn test_oldest_entries_are_evicted() {
        let t0 = Instant::now();
        let mut guard = FrequencyGuard::new(3, ms(20_000));

        for offset in [0, 1_000, 30_000, 31_000, 32_000] {
            guard.record_actuation(t0 + ms(offset));
        }

        assert_eq!(guard.len(), 3);
        // oldest remaining entry is t0+30s
        assert!(guard.is_frequent_now(t0 + ms(32_000)));
    }
}
