//! Screening cycles
//!
//! [`Screener`] runs one cycle end to end: resolve symbols, fetch snapshots
//! under a concurrency bound, extract features, score, rank. Pull mode
//! repeats that on a fixed interval; [`StreamRunner`] drives the same cycle
//! from streamed bar closes.

mod orchestrator;
mod stream;
mod types;

pub use orchestrator::{normalize_symbols, CycleCancelled, Screener, ScreenerSettings};
pub use stream::{confirmation_trigger, StreamRunner, StreamSummary};
pub use types::{CycleKind, CycleReport, SymbolFailure, SymbolNotReady};
