//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use ignition_screener::config::{ScanConfig, UniverseConfig, UniverseMode};
use ignition_screener::exchange::{
    Bar, DataSource, FetchError, FundingSample, Market, OpenInterestSample, Timeframe,
};
use ignition_screener::output::ResultSink;
use ignition_screener::ratelimit::{RateBudget, RateLimiter};
use ignition_screener::screener::{CycleReport, Screener, ScreenerSettings};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// How a mock symbol's data looks
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Profile {
    /// Spot volume spike with buyer CVD above VWAP
    SpotLed { spike: u32 },
    /// Nothing happening
    Flat,
    /// Too little short-timeframe history
    Short,
    /// Coarse close far above its bands
    Overextended,
    /// Every request fails permanently
    Failing,
    /// Requests never complete
    Hanging,
}

pub fn start() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

pub fn bar(open_time: DateTime<Utc>, close: Decimal, volume: Decimal, taker_buy: Decimal) -> Bar {
    Bar {
        open_time,
        open: close,
        high: close + dec!(1),
        low: close - dec!(1),
        close,
        volume,
        quote_volume: volume * close,
        taker_buy_base_volume: taker_buy,
    }
}

fn flat(n: i64, step: Duration) -> Vec<Bar> {
    (0..n)
        .map(|i| bar(start() + step * i as i32, dec!(100), dec!(10), dec!(5)))
        .collect()
}

/// Series for one profile
pub fn series(profile: Profile, timeframe: Timeframe, market: Market) -> Vec<Bar> {
    let minutes = |m: i64| Duration::minutes(m);
    match (market, timeframe) {
        (Market::Perp, _) => flat(1, minutes(5)),
        (Market::Spot, Timeframe::M5) => match profile {
            Profile::Short => flat(10, minutes(5)),
            Profile::SpotLed { spike } => {
                let mut bars = flat(21, minutes(5));
                let volume = Decimal::from(10 * spike);
                bars.push(bar(
                    start() + minutes(5 * 21),
                    dec!(103),
                    volume,
                    volume - dec!(5),
                ));
                bars
            }
            _ => flat(22, minutes(5)),
        },
        (Market::Spot, Timeframe::H4) => (0..30)
            .map(|i| {
                let close = match (profile, i) {
                    (Profile::Overextended, 29) => dec!(120),
                    _ if i % 2 == 0 => dec!(100),
                    _ => dec!(102),
                };
                bar(start() + minutes(240 * i), close, dec!(10), dec!(5))
            })
            .collect(),
        (Market::Spot, _) => flat(30, minutes(1)),
    }
}

/// In-memory data source keyed by symbol
pub struct MockSource {
    pub profiles: HashMap<String, Profile>,
    /// Answer to `fetch_universe`
    pub listed: Vec<String>,
    /// Answer to `fetch_top_by_volume`, before truncation
    pub by_volume: Vec<String>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl MockSource {
    pub fn new(profiles: &[(&str, Profile)]) -> Self {
        let mut listed: Vec<String> = profiles.iter().map(|(s, _)| s.to_string()).collect();
        listed.sort();
        Self {
            profiles: profiles
                .iter()
                .map(|(s, p)| (s.to_string(), *p))
                .collect(),
            by_volume: listed.clone(),
            listed,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    async fn gate(&self, symbol: &str) -> Result<Profile, FetchError> {
        match self.profiles.get(symbol).copied() {
            None => Err(FetchError::Permanent(format!("unknown symbol {symbol}"))),
            Some(Profile::Failing) => Err(FetchError::Permanent("invalid symbol".into())),
            Some(Profile::Hanging) => std::future::pending().await,
            Some(profile) => Ok(profile),
        }
    }
}

#[async_trait]
impl DataSource for MockSource {
    async fn fetch_universe(&self) -> Result<Vec<String>, FetchError> {
        Ok(self.listed.clone())
    }

    async fn fetch_top_by_volume(
        &self,
        n: usize,
        _min_quote_volume: Decimal,
    ) -> Result<Vec<String>, FetchError> {
        Ok(self.by_volume.iter().take(n).cloned().collect())
    }

    async fn fetch_series(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        market: Market,
        _limit: u16,
    ) -> Result<Vec<Bar>, FetchError> {
        let profile = self.gate(symbol).await?;
        Ok(series(profile, timeframe, market))
    }

    async fn fetch_open_interest_history(
        &self,
        symbol: &str,
    ) -> Result<Vec<OpenInterestSample>, FetchError> {
        self.gate(symbol).await?;

        // One call per snapshot, so this counts snapshots in flight
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        Ok(vec![
            OpenInterestSample {
                timestamp: start(),
                value: dec!(1000000),
            },
            OpenInterestSample {
                timestamp: start() + Duration::minutes(5),
                value: dec!(1000000),
            },
        ])
    }

    async fn fetch_funding_history(&self, symbol: &str) -> Result<Vec<FundingSample>, FetchError> {
        self.gate(symbol).await?;
        Ok(vec![FundingSample {
            timestamp: start(),
            rate: dec!(0.0001),
        }])
    }
}

/// Sink that keeps every report it receives, and when it arrived
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub reports: Arc<Mutex<Vec<CycleReport>>>,
    pub published_at: Arc<Mutex<Vec<tokio::time::Instant>>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<CycleReport> {
        self.reports.lock().unwrap().clone()
    }

    pub fn published_at(&self) -> Vec<tokio::time::Instant> {
        self.published_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn publish(&self, report: &CycleReport) -> anyhow::Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        self.published_at
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        Ok(())
    }
}

pub fn list_settings(symbols: &[&str]) -> ScreenerSettings {
    ScreenerSettings {
        universe: UniverseConfig {
            mode: UniverseMode::List,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            ..UniverseConfig::default()
        },
        scan: ScanConfig {
            interval_secs: 0,
            cycles: 1,
            ..ScanConfig::default()
        },
        state_capacity: 200,
        state_min_history: 22,
        weight_ceiling_per_minute: 1200,
    }
}

pub fn screener(
    source: Arc<MockSource>,
    settings: ScreenerSettings,
    sink: &RecordingSink,
) -> Screener {
    let limiter = Arc::new(RateLimiter::new(RateBudget::per_minute(1200, 1200)).unwrap());
    Screener::new(source, limiter, settings, vec![Box::new(sink.clone())])
}

pub fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
