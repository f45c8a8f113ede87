//! Scoring types

use crate::features::FeatureVector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which driver produced the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Path {
    /// Neither path fired
    None,
    /// Cash-market volume led the move
    SpotLed,
    /// Derivative open interest led the move
    PerpLed,
    /// Overextended; all other scoring skipped
    Veto,
}

impl Path {
    pub fn as_str(&self) -> &'static str {
        match self {
            Path::None => "none",
            Path::SpotLed => "spot-led",
            Path::PerpLed => "perp-led",
            Path::Veto => "veto",
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a path fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Overextended,
    SpotLedVolumeSpike,
    PerpLedOiSurge,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Overextended => "overextended",
            ReasonCode::SpotLedVolumeSpike => "spot_led_volume_spike",
            ReasonCode::PerpLedOiSurge => "perp_led_oi_surge",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry, stop and three targets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeLevels {
    pub entry: f64,
    pub stop: f64,
    /// Rolling-high ceiling
    pub tp1: f64,
    /// First pivot resistance
    pub tp2: f64,
    /// Pivot plus prior range
    pub tp3: f64,
}

/// Score, path and reasons before levels are attached
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub score: f64,
    pub path: Path,
    pub reasons: Vec<ReasonCode>,
}

impl Assessment {
    pub fn none() -> Self {
        Self {
            score: 0.0,
            path: Path::None,
            reasons: Vec::new(),
        }
    }

    pub fn veto() -> Self {
        Self {
            score: 0.0,
            path: Path::Veto,
            reasons: vec![ReasonCode::Overextended],
        }
    }

    /// Whether this assessment becomes a ranked result
    pub fn is_signal(&self) -> bool {
        matches!(self.path, Path::SpotLed | Path::PerpLed) && self.score > 0.0
    }
}

/// A ranked ignition result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub score: f64,
    pub path: Path,
    pub reasons: Vec<ReasonCode>,
    pub levels: TradeLevels,
    pub features: FeatureVector,
}

impl Signal {
    /// Reason codes joined with `|`
    pub fn reason_string(&self) -> String {
        self.reasons
            .iter()
            .map(ReasonCode::as_str)
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Outcome of scoring one symbol
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Emit(Signal),
    Vetoed,
    NoSignal,
}
