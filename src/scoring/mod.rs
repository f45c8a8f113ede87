//! Signal scoring
//!
//! Deterministic mapping from a [`FeatureVector`](crate::features::FeatureVector)
//! to a score, a classification path, reason codes and trade levels.

mod engine;
mod types;

pub use engine::{rank, ScoringEngine};
pub use types::{Assessment, Decision, Path, ReasonCode, Signal, TradeLevels};
