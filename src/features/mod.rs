//! Feature extraction
//!
//! Pure, deterministic transforms from a fetched [`Snapshot`] (or a rolling
//! [`StateSnapshot`]) to a fixed-shape feature record. Insufficient history
//! yields [`NotReady`]; a partial feature vector is never produced.
//!
//! [`Snapshot`]: crate::exchange::Snapshot
//! [`StateSnapshot`]: crate::state::StateSnapshot

mod extractor;
pub mod indicators;
mod types;

pub use extractor::{FeatureExtractor, FeatureParams};
pub use types::{FeatureVector, LevelInputs, NotReady, StateFeatures, VwapRelation};
