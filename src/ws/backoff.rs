//! Reconnect backoff schedule

use rand::Rng;
use std::time::Duration;

/// Doubling delay from a floor up to a cap
///
/// Each consecutive failure doubles the delay; [`reset`](Self::reset) returns
/// it to the floor once a connection has proved stable.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    floor: Duration,
    cap: Duration,
    failures: u32,
}

impl ReconnectBackoff {
    pub fn new(floor: Duration, cap: Duration) -> Self {
        Self {
            floor,
            cap: cap.max(floor),
            failures: 0,
        }
    }

    /// Consecutive failures since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Un-jittered delay the next failure will wait
    pub fn current(&self) -> Duration {
        let factor = 2u32.saturating_pow(self.failures.min(31));
        self.floor.saturating_mul(factor).min(self.cap)
    }

    /// Record a failure and return its un-jittered delay
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current();
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Record a failure and return its delay plus up to a quarter extra
    pub fn next_jittered<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let delay = self.next_delay();
        let spread = delay.as_millis() as u64 / 4;
        delay + Duration::from_millis(rng.gen_range(0..=spread))
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn backoff() -> ReconnectBackoff {
        ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(30))
    }

    #[test]
    fn test_doubling_with_cap() {
        let mut b = backoff();
        let schedule: Vec<u64> = (0..7).map(|_| b.next_delay().as_secs()).collect();
        assert_eq!(schedule, vec![1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(b.failures(), 7);
    }

    #[test]
    fn test_reset_returns_to_floor() {
        let mut b = backoff();
        for _ in 0..5 {
            b.next_delay();
        }
        b.reset();
        assert_eq!(b.failures(), 0);
        assert_eq!(b.next_delay(), Duration::from_secs(1));
        assert_eq!(b.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_many_failures_stay_capped() {
        let mut b = backoff();
        for _ in 0..100 {
            assert!(b.next_delay() <= Duration::from_secs(30));
        }
    }

    #[test]
    fn test_jitter_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut b = backoff();
        for _ in 0..10 {
            let base = b.current();
            let delay = b.next_jittered(&mut rng);
            assert!(delay >= base);
            assert!(delay <= base + base / 4);
        }
    }
}
