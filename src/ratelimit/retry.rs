//! Retry policy for rate-limited and transient request failures

use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How a failed attempt should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Upstream asked us to slow down, optionally with an advisory wait
    RateLimited(Option<Duration>),
    /// Connection reset, timeout, server hiccup
    Transient,
    /// Will not succeed on retry
    Permanent,
}

/// Errors that know their own retry classification
pub trait Retryable {
    fn retry_class(&self) -> RetryClass;
}

/// Terminal outcome of a retried operation
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("{0}")]
    Permanent(E),

    #[error("cancelled")]
    Cancelled,
}

/// Bounded exponential backoff with full jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Backoff ceiling for the first retry
    pub base_delay: Duration,
    /// Upper bound for any backoff ceiling
    pub max_delay: Duration,
    /// Wait used for rate-limit responses that carry no advisory delay
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(20),
            default_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff ceiling after the given (1-based) failed attempt
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Full-jitter backoff: uniform in `[0, ceiling]`
    pub fn backoff_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling = self.backoff_ceiling(attempt).as_secs_f64();
        Duration::from_secs_f64(rng.gen_range(0.0..=ceiling))
    }

    /// Advisory wait (or the default) plus up to one base delay of jitter
    pub fn rate_limited_delay<R: Rng + ?Sized>(
        &self,
        retry_after: Option<Duration>,
        rng: &mut R,
    ) -> Duration {
        let advisory = retry_after.unwrap_or(self.default_retry_after);
        let jitter = rng.gen_range(0.0..=self.base_delay.as_secs_f64());
        advisory.saturating_add(Duration::from_secs_f64(jitter))
    }

    /// Run `op` until it succeeds, fails permanently, exhausts the attempt
    /// ceiling, or `cancel` fires
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Retryable + fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                outcome = op() => outcome,
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let class = err.retry_class();
            let delay = match class {
                RetryClass::Permanent => return Err(RetryError::Permanent(err)),
                RetryClass::RateLimited(after) => {
                    metrics::counter!("ignition_rate_limited_responses_total").increment(1);
                    self.rate_limited_delay(after, &mut rand::thread_rng())
                }
                RetryClass::Transient => self.backoff_delay(attempt, &mut rand::thread_rng()),
            };

            if attempt >= self.max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            metrics::counter!("ignition_retries_total").increment(1);
            tracing::warn!(
                error = %err,
                attempt,
                delay_ms = delay.as_millis() as u64,
                rate_limited = matches!(class, RetryClass::RateLimited(_)),
                "Request failed, backing off"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
