//! Cycle report types

use crate::exchange::FetchError;
use crate::features::{NotReady, StateFeatures};
use crate::ratelimit::BudgetUsage;
use crate::scoring::Signal;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// What triggered a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// Scheduled scan of the whole universe
    Scan,
    /// Stream-triggered scan of spiking symbols
    Confirmation,
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleKind::Scan => write!(f, "scan"),
            CycleKind::Confirmation => write!(f, "confirmation"),
        }
    }
}

/// A symbol dropped from this cycle by a fetch error
#[derive(Debug, Clone)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: FetchError,
}

/// A symbol skipped for lack of history
#[derive(Debug, Clone)]
pub struct SymbolNotReady {
    pub symbol: String,
    pub reason: NotReady,
}

/// Everything one cycle produced, handed to every sink
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub kind: CycleKind,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Symbols attempted
    pub symbols: usize,
    /// Ranked signals, best first
    pub results: Vec<Signal>,
    pub failures: Vec<SymbolFailure>,
    pub not_ready: Vec<SymbolNotReady>,
    pub vetoed: Vec<String>,
    /// Rolling-state readings, by symbol; empty when the cycle kept no state
    pub state: Vec<StateFeatures>,
    pub usage: BudgetUsage,
}

impl CycleReport {
    /// Symbols that produced a complete snapshot
    pub fn scored(&self) -> usize {
        self.symbols.saturating_sub(self.failures.len())
    }
}
