//! Feature record types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Latest close relative to the short-window VWAP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VwapRelation {
    Above,
    Below,
}

impl fmt::Display for VwapRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VwapRelation::Above => write!(f, "above"),
            VwapRelation::Below => write!(f, "below"),
        }
    }
}

/// Prior-period extremes used for target levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelInputs {
    /// Highest high of the prior coarse period
    pub prior_high: f64,
    /// Lowest low of the prior coarse period
    pub prior_low: f64,
    /// Close of the last completed coarse bar
    pub prior_close: f64,
    /// Highest coarse high over the rolling lookback
    pub rolling_high: f64,
}

/// Everything the scoring engine needs for one symbol in one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Latest 5m spot volume over the mean of the preceding bars
    pub volume_spike: f64,
    /// Same ratio on the 15m spot series
    pub volume_persistence: f64,
    /// Spot taker buy minus taker sell volume over the short window
    pub spot_cvd: f64,
    /// Perp taker buy minus taker sell volume over the short window
    pub perp_cvd: f64,
    /// Fractional change between the two latest open-interest samples
    pub open_interest_delta: f64,
    /// Change between the two latest funding rates
    pub funding_drift: f64,
    /// Latest perp quote volume over latest spot quote volume
    pub perp_spot_volume_ratio: f64,
    /// Average true range on the 1m spot series
    pub atr: f64,
    /// Position of the 4h close inside its Bollinger bands
    pub band_position: f64,
    pub vwap_relation: VwapRelation,
    pub latest_close: f64,
    /// Std-dev of 5m close-to-close returns (informational)
    pub volatility: f64,
    pub levels: LevelInputs,
}

/// Reduced features derived from rolling state alone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFeatures {
    pub symbol: String,
    /// Std-dev of period-over-period returns
    pub volatility: f64,
    pub volume_spike: f64,
    pub band_position: f64,
    pub vwap_relation: VwapRelation,
    pub latest_close: f64,
}

/// Not enough history to compute a full feature set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotReady {
    /// Series that came up short
    pub series: &'static str,
    pub have: usize,
    pub need: usize,
}

impl fmt::Display for NotReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} has {} points, needs {}",
            self.series, self.have, self.need
        )
    }
}
