//! Indicator math over plain `f64` series (oldest first)

use super::VwapRelation;
use crate::exchange::{decimal_to_f64, Bar};

/// Column-oriented copy of a bar series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
    pub quote_volume: Vec<f64>,
    pub taker_buy: Vec<f64>,
}

impl Series {
    pub fn from_bars(bars: &[Bar]) -> Self {
        let mut series = Series::default();
        for bar in bars {
            series.high.push(decimal_to_f64(bar.high));
            series.low.push(decimal_to_f64(bar.low));
            series.close.push(decimal_to_f64(bar.close));
            series.volume.push(decimal_to_f64(bar.volume));
            series.quote_volume.push(decimal_to_f64(bar.quote_volume));
            series.taker_buy.push(decimal_to_f64(bar.taker_buy_base_volume));
        }
        series
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }
}

/// Bollinger bands
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population standard deviation
pub fn std_dev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
}

/// Sample (n - 1) standard deviation
pub fn sample_std_dev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64).sqrt()
}

/// Last value over the mean of the `baseline` values before it
///
/// `None` when fewer than `baseline + 1` values exist.
pub fn spike_ratio(xs: &[f64], baseline: usize, floor: f64) -> Option<f64> {
    if baseline == 0 || xs.len() < baseline + 1 {
        return None;
    }
    let latest = xs[xs.len() - 1];
    let prior = &xs[xs.len() - 1 - baseline..xs.len() - 1];
    Some(latest / mean(prior).max(floor))
}

/// Taker buy minus taker sell volume summed over the last `window` bars
pub fn cumulative_volume_delta(volume: &[f64], taker_buy: &[f64], window: usize) -> f64 {
    let n = volume.len().min(taker_buy.len());
    let start = n.saturating_sub(window);
    (start..n)
        .map(|i| taker_buy[i] - (volume[i] - taker_buy[i]))
        .sum()
}

/// Per-bar true range; the first bar has no previous close and uses high - low
pub fn true_ranges(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = high.len().min(low.len()).min(close.len());
    (0..n)
        .map(|i| {
            let range = high[i] - low[i];
            if i == 0 {
                return range;
            }
            let prev = close[i - 1];
            range.max((high[i] - prev).abs()).max((low[i] - prev).abs())
        })
        .collect()
}

/// Mean true range over the last `period` bars
pub fn average_true_range(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Option<f64> {
    let ranges = true_ranges(high, low, close);
    if period == 0 || ranges.len() < period {
        return None;
    }
    Some(mean(&ranges[ranges.len() - period..]))
}

/// Simple-moving-average bands `width` sample deviations wide
pub fn bollinger(close: &[f64], period: usize, width: f64) -> Option<Bands> {
    if period == 0 || close.len() < period {
        return None;
    }
    let window = &close[close.len() - period..];
    let middle = mean(window);
    let deviation = sample_std_dev(window);
    Some(Bands {
        upper: middle + deviation * width,
        middle,
        lower: middle - deviation * width,
    })
}

/// Where `price` sits between the bands; 0.5 when the bands have collapsed
pub fn band_position(price: f64, bands: &Bands, floor: f64) -> f64 {
    if bands.upper == bands.lower {
        return 0.5;
    }
    (price - bands.lower) / (bands.upper - bands.lower).max(floor)
}

/// Weighted average of `prices`
pub fn weighted_average(prices: &[f64], weights: &[f64], floor: f64) -> f64 {
    let total: f64 = weights.iter().sum();
    let weighted: f64 = prices.iter().zip(weights).map(|(p, w)| p * w).sum();
    weighted / total.max(floor)
}

/// VWAP using the typical price `(high + low + close) / 3`
pub fn vwap(series: &Series, floor: f64) -> f64 {
    let typical: Vec<f64> = (0..series.len())
        .map(|i| (series.high[i] + series.low[i] + series.close[i]) / 3.0)
        .collect();
    weighted_average(&typical, &series.quote_volume, floor)
}

pub fn vwap_relation(close: f64, vwap: f64) -> VwapRelation {
    if close > vwap {
        VwapRelation::Above
    } else {
        VwapRelation::Below
    }
}

/// Simple close-to-close returns
pub fn returns(close: &[f64]) -> Vec<f64> {
    close
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

/// Fractional change between the last two values, denominator floored
pub fn last_change_ratio(xs: &[f64], floor: f64) -> f64 {
    match xs {
        [.., prev, last] => (last - prev) / prev.max(floor),
        _ => 0.0,
    }
}

/// Difference between the last two values
pub fn last_difference(xs: &[f64]) -> f64 {
    match xs {
        [.., prev, last] => last - prev,
        _ => 0.0,
    }
}
