//! Scoring engine

use super::{Assessment, Decision, Path, ReasonCode, Signal, TradeLevels};
use crate::features::{FeatureVector, VwapRelation};
use chrono::{DateTime, Utc};

/// Band position above which a symbol is vetoed
const VETO_BAND_POSITION: f64 = 0.95;

// Spot-led gate
const SPOT_MIN_VOLUME_SPIKE: f64 = 2.5;
const SPOT_MAX_PERP_RATIO: f64 = 1.5;

// Perp-led gate
const PERP_MIN_OI_DELTA: f64 = 0.02;
const PERP_MIN_SPOT_CVD: f64 = -100.0;

/// Volume normalising the CVD terms
const CVD_SCALE: f64 = 1000.0;
const FUNDING_DRIFT_BONUS: f64 = 10.0;
const STOP_ATR_MULTIPLE: f64 = 2.0;
const MAX_SCORE: f64 = 100.0;

/// Pure scoring of feature vectors
///
/// Thresholds and per-term caps are fixed; identical input always yields
/// identical output apart from the caller-supplied timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score a feature vector without levels
    pub fn assess(&self, f: &FeatureVector) -> Assessment {
        if f.band_position > VETO_BAND_POSITION {
            return Assessment::veto();
        }

        let mut reasons = Vec::new();

        let spot_score = if spot_led_gate(f) {
            reasons.push(ReasonCode::SpotLedVolumeSpike);
            spot_led_score(f)
        } else {
            0.0
        };

        let perp_score = if perp_led_gate(f) {
            reasons.push(ReasonCode::PerpLedOiSurge);
            perp_led_score(f)
        } else {
            0.0
        };

        if spot_score >= perp_score && spot_score > 0.0 {
            Assessment {
                score: spot_score.min(MAX_SCORE),
                path: Path::SpotLed,
                reasons,
            }
        } else if perp_score > 0.0 {
            Assessment {
                score: perp_score.min(MAX_SCORE),
                path: Path::PerpLed,
                reasons,
            }
        } else {
            Assessment::none()
        }
    }

    /// Entry, ATR stop and pivot/rolling-high targets
    pub fn levels(&self, f: &FeatureVector) -> TradeLevels {
        let entry = f.latest_close;
        let prior = &f.levels;
        let pivot = (prior.prior_high + prior.prior_low + prior.prior_close) / 3.0;

        TradeLevels {
            entry,
            stop: entry - f.atr * STOP_ATR_MULTIPLE,
            tp1: prior.rolling_high,
            tp2: 2.0 * pivot - prior.prior_low,
            tp3: pivot + (prior.prior_high - prior.prior_low),
        }
    }

    /// Full decision for one symbol
    pub fn score(
        &self,
        symbol: &str,
        features: &FeatureVector,
        timestamp: DateTime<Utc>,
    ) -> Decision {
        let assessment = self.assess(features);
        match assessment.path {
            Path::Veto => Decision::Vetoed,
            _ if !assessment.is_signal() => Decision::NoSignal,
            _ => Decision::Emit(Signal {
                timestamp,
                symbol: symbol.to_string(),
                score: assessment.score,
                path: assessment.path,
                reasons: assessment.reasons,
                levels: self.levels(features),
                features: features.clone(),
            }),
        }
    }
}

fn spot_led_gate(f: &FeatureVector) -> bool {
    f.volume_spike > SPOT_MIN_VOLUME_SPIKE
        && f.spot_cvd > 0.0
        && f.perp_spot_volume_ratio < SPOT_MAX_PERP_RATIO
        && f.vwap_relation == VwapRelation::Above
}

fn spot_led_score(f: &FeatureVector) -> f64 {
    (f.volume_spike * 10.0).min(50.0)
        + (f.volume_persistence * 10.0).min(20.0)
        + (f.spot_cvd / CVD_SCALE).min(1.0) * 15.0
        + (1.0 - f.perp_spot_volume_ratio).max(0.0) * 15.0
}

fn perp_led_gate(f: &FeatureVector) -> bool {
    f.open_interest_delta > PERP_MIN_OI_DELTA
        && f.perp_cvd > 0.0
        && f.spot_cvd > PERP_MIN_SPOT_CVD
}

fn perp_led_score(f: &FeatureVector) -> f64 {
    let bonus = if f.funding_drift > 0.0 {
        FUNDING_DRIFT_BONUS
    } else {
        0.0
    };
    (f.open_interest_delta * 1000.0).min(40.0) + (f.perp_cvd / CVD_SCALE).min(1.0) * 30.0 + bonus
}

/// Order signals by score descending, then symbol ascending
pub fn rank(signals: &mut [Signal]) {
    signals.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
}
