//! Symbol-keyed state store with a single writer

use super::{StateSnapshot, SymbolState};
use crate::exchange::{decimal_to_f64, Bar};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Result of applying one bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Bar appended to the symbol's windows
    Applied,
    /// Bar not newer than the last one applied for this symbol
    Stale,
    /// Symbol is not in the tracked universe
    Untracked,
}

/// Symbols gained and lost by a universe sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniverseChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl UniverseChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

struct Entry {
    state: SymbolState,
    last_bar: Option<DateTime<Utc>>,
}

/// Owned map from symbol to rolling state
///
/// Partitioned by symbol, so no cross-symbol locking exists: whoever owns the
/// store is the only writer, and readers take [`StateSnapshot`]s.
pub struct StateStore {
    capacity: usize,
    entries: HashMap<String, Entry>,
}

impl StateStore {
    /// Empty store whose symbol windows hold `capacity` closes
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
        }
    }

    /// Replace the tracked universe
    ///
    /// Surviving symbols keep their history, new symbols start empty, and
    /// symbols no longer present are dropped.
    pub fn sync_universe(&mut self, symbols: &[String]) -> UniverseChange {
        let mut previous = std::mem::take(&mut self.entries);
        let mut change = UniverseChange::default();

        for symbol in symbols {
            if self.entries.contains_key(symbol) {
                continue;
            }
            let entry = previous.remove(symbol).unwrap_or_else(|| {
                change.added.push(symbol.clone());
                Entry {
                    state: SymbolState::new(symbol.clone(), self.capacity),
                    last_bar: None,
                }
            });
            self.entries.insert(symbol.clone(), entry);
        }

        change.removed = previous.into_keys().collect();
        change.removed.sort();
        metrics::gauge!("ignition_tracked_symbols").set(self.entries.len() as f64);

        if !change.is_empty() {
            tracing::info!(
                added = change.added.len(),
                removed = change.removed.len(),
                tracked = self.entries.len(),
                "Tracked universe updated"
            );
        }
        change
    }

    /// Apply a closed bar to its symbol's state
    pub fn ingest(&mut self, symbol: &str, bar: &Bar, now: DateTime<Utc>) -> IngestOutcome {
        let Some(entry) = self.entries.get_mut(symbol) else {
            return IngestOutcome::Untracked;
        };

        if entry.last_bar.is_some_and(|last| bar.open_time <= last) {
            return IngestOutcome::Stale;
        }

        entry
            .state
            .update(decimal_to_f64(bar.close), decimal_to_f64(bar.volume), now);
        entry.last_bar = Some(bar.open_time);
        IngestOutcome::Applied
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolState> {
        self.entries.get(symbol).map(|e| &e.state)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.entries.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracked symbols, sorted
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.entries.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Point-in-time copies of every tracked symbol, sorted by symbol
    pub fn snapshots(&self) -> Vec<StateSnapshot> {
        let mut snapshots: Vec<StateSnapshot> =
            self.entries.values().map(|e| e.state.snapshot()).collect();
        snapshots.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        snapshots
    }
}
