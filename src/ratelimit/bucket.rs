//! Weighted token bucket with lazy, monotonic refill

use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Trailing window for the consumed-weight summary
const USAGE_WINDOW: Duration = Duration::from_secs(60);

/// Shortest sleep between refill checks while waiting for tokens
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Bucket parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateBudget {
    /// Maximum tokens the bucket can hold
    pub capacity: f64,
    /// Tokens added per second
    pub refill_per_sec: f64,
}

impl RateBudget {
    /// Budget expressed the way exchanges advertise it: weight per minute
    pub fn per_minute(capacity: u32, refill_per_minute: u32) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec: refill_per_minute as f64 / 60.0,
        }
    }
}

/// Acknowledgement returned once weight has been debited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Weight debited from the bucket
    pub weight: u32,
    /// Time spent waiting for tokens (including lock contention)
    pub waited: Duration,
}

/// Point-in-time utilization summary of the bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetUsage {
    pub capacity: f64,
    pub available: f64,
    /// Weight debited since the limiter was created
    pub consumed_total: u64,
    /// Weight debited in the trailing minute
    pub consumed_last_minute: u64,
}

impl BudgetUsage {
    /// Fraction of capacity consumed in the trailing minute
    pub fn utilization(&self) -> f64 {
        if self.capacity <= 0.0 {
            return 0.0;
        }
        self.consumed_last_minute as f64 / self.capacity
    }
}

/// Rate limiter errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LimiterError {
    #[error("invalid budget: capacity {capacity}, refill {refill_per_sec}/s")]
    InvalidBudget { capacity: f64, refill_per_sec: f64 },

    #[error("request weight {weight} exceeds bucket capacity {capacity}")]
    WeightExceedsCapacity { weight: u32, capacity: f64 },
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
    consumed_total: u64,
    recent: VecDeque<(Instant, u32)>,
}

impl BucketState {
    fn refill(&mut self, now: Instant, budget: &RateBudget) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        self.tokens = (self.tokens + elapsed.as_secs_f64() * budget.refill_per_sec)
            .min(budget.capacity);
        self.last_refill = now;
    }

    fn debit(&mut self, now: Instant, weight: u32) {
        self.tokens = (self.tokens - weight as f64).max(0.0);
        self.consumed_total += weight as u64;
        self.recent.push_back((now, weight));
        self.prune(now);
    }

    fn prune(&mut self, now: Instant) {
        while let Some((at, _)) = self.recent.front() {
            if now.saturating_duration_since(*at) >= USAGE_WINDOW {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Token-bucket admission control shared by every outbound request
///
/// Refill, sufficiency check and debit happen under one lock, so two callers
/// can never spend the same tokens. Waiters queue on the lock in FIFO order;
/// dropping an `acquire` future releases its place immediately.
pub struct RateLimiter {
    budget: RateBudget,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Create a limiter that starts with a full bucket
    pub fn new(budget: RateBudget) -> Result<Self, LimiterError> {
        if !(budget.capacity > 0.0 && budget.refill_per_sec > 0.0) {
            return Err(LimiterError::InvalidBudget {
                capacity: budget.capacity,
                refill_per_sec: budget.refill_per_sec,
            });
        }

        Ok(Self {
            budget,
            state: Mutex::new(BucketState {
                tokens: budget.capacity,
                last_refill: Instant::now(),
                consumed_total: 0,
                recent: VecDeque::new(),
            }),
        })
    }

    /// Bucket parameters
    pub fn budget(&self) -> RateBudget {
        self.budget
    }

    /// Wait until the bucket holds `weight` tokens, then debit them
    pub async fn acquire(&self, weight: u32) -> Result<Ack, LimiterError> {
        let needed = weight as f64;
        if needed > self.budget.capacity {
            return Err(LimiterError::WeightExceedsCapacity {
                weight,
                capacity: self.budget.capacity,
            });
        }

        let started = Instant::now();
        let mut state = self.state.lock().await;

        loop {
            let now = Instant::now();
            state.refill(now, &self.budget);

            if state.tokens >= needed {
                state.debit(now, weight);
                let waited = now.saturating_duration_since(started);
                if !waited.is_zero() {
                    tracing::debug!(
                        weight,
                        waited_ms = waited.as_millis() as u64,
                        "Rate limiter admitted request after waiting"
                    );
                }
                return Ok(Ack { weight, waited });
            }

            let deficit = needed - state.tokens;
            let wait = Duration::from_secs_f64(deficit / self.budget.refill_per_sec).max(MIN_WAIT);
            sleep(wait).await;
        }
    }

    /// Current utilization summary
    pub async fn usage(&self) -> BudgetUsage {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.refill(now, &self.budget);
        state.prune(now);

        BudgetUsage {
            capacity: self.budget.capacity,
            available: state.tokens,
            consumed_total: state.consumed_total,
            consumed_last_minute: state.recent.iter().map(|(_, w)| *w as u64).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready_ok};

    fn limiter(capacity: f64, refill_per_sec: f64) -> RateLimiter {
        RateLimiter::new(RateBudget {
            capacity,
            refill_per_sec,
        })
        .unwrap()
    }

    #[test]
    fn test_budget_per_minute() {
        let budget = RateBudget::per_minute(1200, 1200);
        assert_eq!(budget.capacity, 1200.0);
        assert!((budget.refill_per_sec - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_budget_rejected() {
        let result = RateLimiter::new(RateBudget {
            capacity: 10.0,
            refill_per_sec: 0.0,
        });
        assert!(matches!(result, Err(LimiterError::InvalidBudget { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_capacity_is_immediate() {
        let limiter = limiter(10.0, 1.0);
        let ack = limiter.acquire(4).await.unwrap();
        assert_eq!(ack.weight, 4);
        assert_eq!(ack.waited, Duration::ZERO);

        let usage = limiter.usage().await;
        assert!((usage.available - 6.0).abs() < 1e-9);
        assert_eq!(usage.consumed_total, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let limiter = limiter(10.0, 10.0);
        limiter.acquire(10).await.unwrap();

        let ack = limiter.acquire(5).await.unwrap();
        assert!(ack.waited >= Duration::from_millis(500));
        assert!(ack.waited < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_pending_until_tokens_available() {
        let limiter = limiter(10.0, 10.0);
        limiter.acquire(10).await.unwrap();

        let mut task = tokio_test::task::spawn(limiter.acquire(5));
        assert_pending!(task.poll());

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_pending!(task.poll());

        tokio::time::advance(Duration::from_millis(400)).await;
        let ack = assert_ready_ok!(task.poll());
        assert_eq!(ack.weight, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_weight_above_capacity_rejected() {
        let limiter = limiter(10.0, 10.0);
        let result = limiter.acquire(11).await;
        assert!(matches!(
            result,
            Err(LimiterError::WeightExceedsCapacity { weight: 11, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_capped_at_capacity() {
        let limiter = limiter(10.0, 5.0);
        limiter.acquire(3).await.unwrap();

        tokio::time::sleep(Duration::from_secs(3600)).await;
        let usage = limiter.usage().await;
        assert!((usage.available - 10.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_debits_never_exceed_refill() {
        let limiter = Arc::new(limiter(10.0, 10.0));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.acquire(5).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let elapsed = start.elapsed().as_secs_f64();
        let usage = limiter.usage().await;
        assert_eq!(usage.consumed_total, 100);
        // Debits can never outrun the initial bucket plus theoretical refill
        assert!(usage.consumed_total as f64 <= 10.0 + elapsed * 10.0 + 1e-6);
        assert!(elapsed >= 9.0 - 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_usage_window_expires() {
        let limiter = limiter(100.0, 100.0);
        limiter.acquire(30).await.unwrap();
        assert_eq!(limiter.usage().await.consumed_last_minute, 30);

        tokio::time::sleep(Duration::from_secs(61)).await;
        let usage = limiter.usage().await;
        assert_eq!(usage.consumed_last_minute, 0);
        assert_eq!(usage.consumed_total, 30);
    }

    #[test]
    fn test_utilization() {
        let usage = BudgetUsage {
            capacity: 1200.0,
            available: 600.0,
            consumed_total: 900,
            consumed_last_minute: 300,
        };
        assert!((usage.utilization() - 0.25).abs() < 1e-12);
    }
}
