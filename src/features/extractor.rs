//! Snapshot and state feature extraction

use super::indicators::{self, Series};
use super::{FeatureVector, LevelInputs, NotReady, StateFeatures};
use crate::exchange::{decimal_to_f64, Snapshot};
use crate::state::StateSnapshot;

/// Indicator windows and minimum history requirements
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureParams {
    /// Bars averaged for the 5m volume-spike baseline (latest excluded)
    pub spike_baseline: usize,
    /// Bars averaged for the 15m persistence baseline (latest excluded)
    pub persistence_baseline: usize,
    /// Minimum 5m spot bars
    pub min_short_bars: usize,
    /// Minimum 15m spot bars
    pub min_persistence_bars: usize,
    /// Bars summed for cumulative volume delta
    pub cvd_window: usize,
    pub atr_period: usize,
    pub band_period: usize,
    /// Band half-width in sample standard deviations
    pub band_width: f64,
    /// Completed 4h bars forming the prior period for pivots
    pub pivot_bars: usize,
    /// 4h bars scanned for the rolling-high target
    pub rolling_high_bars: usize,
    /// Lower bound applied to ratio denominators
    pub denominator_floor: f64,
    /// Minimum closes before rolling state is scored
    pub min_state_history: usize,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            spike_baseline: 20,
            persistence_baseline: 4,
            min_short_bars: 22,
            min_persistence_bars: 6,
            cvd_window: 1,
            atr_period: 14,
            band_period: 20,
            band_width: 2.0,
            pivot_bars: 6,
            rolling_high_bars: 24,
            denominator_floor: 1e-9,
            min_state_history: 22,
        }
    }
}

impl FeatureParams {
    /// Closes a rolling state needs before `extract_state` can succeed
    pub fn state_history_needed(&self) -> usize {
        self.min_state_history
            .max(self.spike_baseline + 1)
            .max(self.band_period)
    }
}

/// Pure transform from market data to features
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    params: FeatureParams,
}

fn require(series: &'static str, have: usize, need: usize) -> Result<(), NotReady> {
    if have < need {
        return Err(NotReady { series, have, need });
    }
    Ok(())
}

impl FeatureExtractor {
    pub fn new(params: FeatureParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FeatureParams {
        &self.params
    }

    /// Full feature vector from a complete snapshot
    pub fn extract(&self, snapshot: &Snapshot) -> Result<FeatureVector, NotReady> {
        let p = &self.params;
        let floor = p.denominator_floor;

        let short_need = p.min_short_bars.max(p.spike_baseline + 1);
        let persistence_need = p.min_persistence_bars.max(p.persistence_baseline + 1);
        let coarse_need = p.band_period.max(p.pivot_bars + 1);

        require("spot_5m", snapshot.spot_5m.len(), short_need)?;
        require("spot_15m", snapshot.spot_15m.len(), persistence_need)?;
        require("spot_1m", snapshot.spot_1m.len(), p.atr_period.max(1))?;
        require("spot_4h", snapshot.spot_4h.len(), coarse_need)?;
        require("perp_5m", snapshot.perp_5m.len(), p.cvd_window.max(1))?;

        let short = Series::from_bars(&snapshot.spot_5m);
        let persistence = Series::from_bars(&snapshot.spot_15m);
        let fine = Series::from_bars(&snapshot.spot_1m);
        let coarse = Series::from_bars(&snapshot.spot_4h);
        let perp = Series::from_bars(&snapshot.perp_5m);

        let not_ready = |series, have, need| NotReady { series, have, need };

        let volume_spike = indicators::spike_ratio(&short.volume, p.spike_baseline, floor)
            .ok_or_else(|| not_ready("spot_5m", short.len(), short_need))?;
        let volume_persistence =
            indicators::spike_ratio(&persistence.volume, p.persistence_baseline, floor)
                .ok_or_else(|| not_ready("spot_15m", persistence.len(), persistence_need))?;
        let atr = indicators::average_true_range(&fine.high, &fine.low, &fine.close, p.atr_period)
            .ok_or_else(|| not_ready("spot_1m", fine.len(), p.atr_period))?;
        let bands = indicators::bollinger(&coarse.close, p.band_period, p.band_width)
            .ok_or_else(|| not_ready("spot_4h", coarse.len(), coarse_need))?;

        let spot_cvd =
            indicators::cumulative_volume_delta(&short.volume, &short.taker_buy, p.cvd_window);
        let perp_cvd =
            indicators::cumulative_volume_delta(&perp.volume, &perp.taker_buy, p.cvd_window);

        let open_interest: Vec<f64> = snapshot
            .open_interest
            .iter()
            .map(|s| decimal_to_f64(s.value))
            .collect();
        let funding: Vec<f64> = snapshot
            .funding
            .iter()
            .map(|s| decimal_to_f64(s.rate))
            .collect();

        let latest_spot_quote = short.quote_volume.last().copied().unwrap_or(0.0);
        let latest_perp_quote = perp.quote_volume.last().copied().unwrap_or(0.0);

        let latest_close = short.close.last().copied().unwrap_or(0.0);
        let coarse_close = coarse.close.last().copied().unwrap_or(0.0);
        let vwap = indicators::vwap(&short, floor);

        Ok(FeatureVector {
            volume_spike,
            volume_persistence,
            spot_cvd,
            perp_cvd,
            open_interest_delta: indicators::last_change_ratio(&open_interest, floor),
            funding_drift: indicators::last_difference(&funding),
            perp_spot_volume_ratio: latest_perp_quote / latest_spot_quote.max(floor),
            atr,
            band_position: indicators::band_position(coarse_close, &bands, floor),
            vwap_relation: indicators::vwap_relation(latest_close, vwap),
            latest_close,
            volatility: indicators::std_dev(&indicators::returns(&short.close)),
            levels: self.level_inputs(&coarse),
        })
    }

    /// Prior-period extremes from the coarse series (caller guarantees length)
    fn level_inputs(&self, coarse: &Series) -> LevelInputs {
        let n = coarse.len();
        let prior = n.saturating_sub(self.params.pivot_bars + 1)..n.saturating_sub(1);
        let rolling = n.saturating_sub(self.params.rolling_high_bars)..n;

        LevelInputs {
            prior_high: coarse.high[prior.clone()]
                .iter()
                .copied()
                .fold(f64::MIN, f64::max),
            prior_low: coarse.low[prior.clone()]
                .iter()
                .copied()
                .fold(f64::MAX, f64::min),
            prior_close: coarse.close[prior.end.saturating_sub(1)],
            rolling_high: coarse.high[rolling].iter().copied().fold(f64::MIN, f64::max),
        }
    }

    /// Reduced features from a rolling-state snapshot
    pub fn extract_state(&self, snapshot: &StateSnapshot) -> Result<StateFeatures, NotReady> {
        let p = &self.params;
        let floor = p.denominator_floor;
        let need = p.state_history_needed();

        require("closes", snapshot.closes.len(), need)?;
        require("volumes", snapshot.volumes.len(), need)?;

        let volume_spike = indicators::spike_ratio(&snapshot.volumes, p.spike_baseline, floor)
            .ok_or(NotReady {
                series: "volumes",
                have: snapshot.volumes.len(),
                need,
            })?;
        let bands = indicators::bollinger(&snapshot.closes, p.band_period, p.band_width).ok_or(
            NotReady {
                series: "closes",
                have: snapshot.closes.len(),
                need,
            },
        )?;

        let latest_close = snapshot.closes.last().copied().unwrap_or(0.0);
        let weighted_close =
            indicators::weighted_average(&snapshot.closes, &snapshot.volumes, floor);

        Ok(StateFeatures {
            symbol: snapshot.symbol.clone(),
            volatility: indicators::std_dev(&snapshot.returns),
            volume_spike,
            band_position: indicators::band_position(latest_close, &bands, floor),
            vwap_relation: indicators::vwap_relation(latest_close, weighted_close),
            latest_close,
        })
    }
}
