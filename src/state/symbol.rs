//! Rolling history for one symbol

use super::RollingWindow;
use chrono::{DateTime, Utc};

/// Mutable rolling history of one tracked symbol
///
/// `returns` holds the period-over-period change between consecutive retained
/// closes, so it is always exactly one shorter than `closes` (or empty).
#[derive(Debug, Clone)]
pub struct SymbolState {
    symbol: String,
    closes: RollingWindow<f64>,
    volumes: RollingWindow<f64>,
    returns: RollingWindow<f64>,
    last_close: Option<f64>,
    last_update: Option<DateTime<Utc>>,
}

impl SymbolState {
    /// Fresh state whose windows hold at most `capacity` closes
    pub fn new(symbol: impl Into<String>, capacity: usize) -> Self {
        Self {
            symbol: symbol.into(),
            closes: RollingWindow::new(capacity),
            volumes: RollingWindow::new(capacity),
            returns: RollingWindow::new(capacity.saturating_sub(1)),
            last_close: None,
            last_update: None,
        }
    }

    /// Apply one observation
    pub fn update(&mut self, close: f64, volume: f64, now: DateTime<Utc>) {
        if let Some(prev) = self.last_close {
            let change = if prev > 0.0 {
                (close - prev) / prev
            } else {
                0.0
            };
            self.returns.push(change);
        }
        self.closes.push(close);
        self.volumes.push(volume);
        self.last_close = Some(close);
        self.last_update = Some(now);
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn capacity(&self) -> usize {
        self.closes.capacity()
    }

    /// Number of closes currently retained
    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.last_close
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Copy-on-read view for feature extraction
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            symbol: self.symbol.clone(),
            closes: self.closes.to_vec(),
            volumes: self.volumes.to_vec(),
            returns: self.returns.to_vec(),
            last_close: self.last_close,
            last_update: self.last_update,
        }
    }
}

/// Immutable point-in-time copy of a [`SymbolState`]
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub symbol: String,
    pub closes: Vec<f64>,
    pub volumes: Vec<f64>,
    pub returns: Vec<f64>,
    pub last_close: Option<f64>,
    pub last_update: Option<DateTime<Utc>>,
}
