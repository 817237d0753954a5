use std::time::Duration;

/// Exponential reconnect delay: `initial`, doubled per failure, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; the following call returns double, up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    pub fn peek(&self) -> Duration {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_until_cap() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        let delays: Vec<u64> = (0..8).map(|_| b.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);

        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_non_decreasing_and_bounded() {
        let max = Duration::from_millis(750);
        let mut b = Backoff::new(Duration::from_millis(3), max);
        let mut prev = Duration::ZERO;
        for _ in 0..64 {
            let d = b.next_delay();
            assert!(d >= prev);
            assert!(d <= max);
            prev = d;
        }
        assert_eq!(prev, max);
    }

    #[test]
    fn test_initial_above_cap_is_clamped() {
        let ceiling = Duration::from_secs(1);
        let mut b = Backoff::new(Duration::from_secs(5), ceiling);
        assert_eq!(b.next_delay(), ceiling);
        assert_eq!(b.next_delay(), ceiling);
        b.reset();
        assert_eq!(b.peek(), ceiling);
    }
}
