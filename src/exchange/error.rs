//! Fetch error taxonomy

use crate::ratelimit::{LimiterError, RetryClass, RetryError, Retryable};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a [`DataSource`](super::DataSource)
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// HTTP 429/418: upstream asked us to back off
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Connection reset, timeout, or server-side failure
    #[error("transient failure: {0}")]
    Transient(String),

    /// Malformed response, unknown symbol, unauthorized
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Retry ceiling reached on a retryable failure
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<FetchError> },

    /// Shutdown requested while waiting
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Limiter(#[from] LimiterError),
}

impl FetchError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            FetchError::RateLimited { retry_after }
        } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            FetchError::Transient(format!("HTTP {}: {}", status, body))
        } else {
            FetchError::Permanent(format!("HTTP {}: {}", status, body))
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

impl Retryable for FetchError {
    fn retry_class(&self) -> RetryClass {
        match self {
            FetchError::RateLimited { retry_after } => RetryClass::RateLimited(*retry_after),
            FetchError::Transient(_) => RetryClass::Transient,
            _ => RetryClass::Permanent,
        }
    }
}

impl From<RetryError<FetchError>> for FetchError {
    fn from(err: RetryError<FetchError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, last } => FetchError::RetriesExhausted {
                attempts,
                last: Box::new(last),
            },
            RetryError::Permanent(err) => err,
            RetryError::Cancelled => FetchError::Cancelled,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() || err.is_builder() {
            FetchError::Permanent(err.to_string())
        } else {
            FetchError::Transient(err.to_string())
        }
    }
}
