//! Rate governance for outbound requests
//!
//! A weighted token bucket bounds request weight per unit time, and a retry
//! policy re-issues transient failures with bounded exponential backoff.

mod bucket;
mod retry;

pub use bucket::{Ack, BudgetUsage, LimiterError, RateBudget, RateLimiter};
pub use retry::{RetryClass, RetryError, RetryPolicy, Retryable};
