//! Per-symbol rolling state
//!
//! The store is owned by a single ingestion path and mutated only through
//! [`StateStore::ingest`]; readers work from point-in-time
//! [`StateSnapshot`] copies.

mod store;
mod symbol;
mod window;

pub use store::{IngestOutcome, StateStore, UniverseChange};
pub use symbol::{StateSnapshot, SymbolState};
pub use window::RollingWindow;
