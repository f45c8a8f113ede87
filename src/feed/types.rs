//! Feed types

use crate::exchange::{Bar, Timeframe};
use crate::ws::ConnectionState;
use chrono::{DateTime, Utc};
use std::fmt;
use tokio::sync::{mpsc, watch};

/// A confirmed (closed) bar for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct KlineClose {
    pub symbol: String,
    pub interval: Timeframe,
    pub bar: Bar,
    /// Local receive time
    pub received_at: DateTime<Utc>,
}

/// Why a frame was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    /// Not JSON or missing required fields (includes subscription acks)
    Malformed,
    /// Some other event type
    NotKline,
    /// Bar still forming
    Unclosed,
    IntervalMismatch,
    Untracked,
}

impl Discard {
    pub fn as_str(&self) -> &'static str {
        match self {
            Discard::Malformed => "malformed",
            Discard::NotKline => "not_kline",
            Discard::Unclosed => "unclosed",
            Discard::IntervalMismatch => "interval_mismatch",
            Discard::Untracked => "untracked",
        }
    }
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiving side of a running feed
pub struct FeedHandle {
    /// Bar closes in arrival order
    pub klines: mpsc::Receiver<KlineClose>,
    pub state: watch::Receiver<ConnectionState>,
}
