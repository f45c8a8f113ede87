//! Pull-mode cycle orchestration

use super::{CycleKind, CycleReport, SymbolFailure, SymbolNotReady};
use crate::config::{Config, ScanConfig, UniverseConfig, UniverseMode};
use crate::exchange::{fetch_snapshot, DataSource, FetchError, Snapshot, Timeframe};
use crate::features::{FeatureExtractor, FeatureParams};
use crate::output::{publish_all, ResultSink};
use crate::ratelimit::{BudgetUsage, RateLimiter};
use crate::scoring::{rank, Decision, ScoringEngine};
use crate::state::{IngestOutcome, StateStore};
use crate::telemetry::{record_cycle, record_usage};
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Timeframe whose closed bars feed the rolling state
const STATE_TIMEFRAME: Timeframe = Timeframe::M5;

/// Shutdown interrupted a cycle; its partial results are discarded
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("cycle cancelled")]
pub struct CycleCancelled;

/// Immutable run settings
#[derive(Debug, Clone)]
pub struct ScreenerSettings {
    pub universe: UniverseConfig,
    pub scan: ScanConfig,
    /// Closes retained per symbol
    pub state_capacity: usize,
    /// Closes required before a symbol's state is read
    pub state_min_history: usize,
    /// Trailing-minute weight that triggers a budget warning
    pub weight_ceiling_per_minute: u32,
}

impl ScreenerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            universe: config.universe.clone(),
            scan: config.scan.clone(),
            state_capacity: config.stream.window_capacity,
            state_min_history: config.stream.min_history,
            weight_ceiling_per_minute: config.rate_limit.weight_ceiling_per_minute,
        }
    }
}

/// Upper-cased, de-duplicated, order preserved
pub fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

/// Drives acquisition, state, features, scoring and ranking
///
/// Cheap to clone: every collaborator is shared.
#[derive(Clone)]
pub struct Screener {
    source: Arc<dyn DataSource>,
    limiter: Arc<RateLimiter>,
    extractor: FeatureExtractor,
    state_extractor: FeatureExtractor,
    engine: ScoringEngine,
    settings: ScreenerSettings,
    sinks: Arc<Vec<Box<dyn ResultSink>>>,
}

impl Screener {
    pub fn new(
        source: Arc<dyn DataSource>,
        limiter: Arc<RateLimiter>,
        settings: ScreenerSettings,
        sinks: Vec<Box<dyn ResultSink>>,
    ) -> Self {
        let state_extractor = FeatureExtractor::new(FeatureParams {
            min_state_history: settings.state_min_history,
            ..FeatureParams::default()
        });
        Self {
            source,
            limiter,
            extractor: FeatureExtractor::default(),
            state_extractor,
            engine: ScoringEngine::new(),
            settings,
            sinks: Arc::new(sinks),
        }
    }

    pub fn settings(&self) -> &ScreenerSettings {
        &self.settings
    }

    /// Symbols to screen under the configured universe mode
    pub async fn resolve_universe(&self) -> Result<Vec<String>, FetchError> {
        let universe = &self.settings.universe;
        let symbols = match universe.mode {
            UniverseMode::All => self.source.fetch_universe().await?,
            UniverseMode::Top => {
                let (ranked, listed) = tokio::try_join!(
                    self.source
                        .fetch_top_by_volume(usize::MAX, universe.min_quote_volume),
                    self.source.fetch_universe(),
                )?;
                let listed: HashSet<String> = listed.into_iter().collect();
                ranked
                    .into_iter()
                    .filter(|s| listed.contains(s))
                    .take(universe.top_n)
                    .collect()
            }
            UniverseMode::List => normalize_symbols(&universe.symbols),
        };

        tracing::info!(mode = ?universe.mode, count = symbols.len(), "Resolved symbol universe");
        Ok(symbols)
    }

    /// Fetch complete snapshots for `symbols`, at most `max_concurrency` at once
    ///
    /// Per-symbol failures are collected; they never abort sibling fetches.
    pub async fn fetch_snapshots(
        &self,
        symbols: &[String],
        cancel: &CancellationToken,
    ) -> Result<(Vec<Snapshot>, Vec<SymbolFailure>), CycleCancelled> {
        let semaphore = Arc::new(Semaphore::new(self.settings.scan.max_concurrency.max(1)));
        let lookback = self.settings.scan.lookback_bars;
        let mut set = JoinSet::new();

        for symbol in symbols {
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);
            let symbol = symbol.clone();
            set.spawn(async move {
                let result = fetch_admitted(source.as_ref(), &semaphore, &symbol, lookback).await;
                (symbol, result)
            });
        }

        let mut snapshots = Vec::with_capacity(symbols.len());
        let mut failures = Vec::new();

        loop {
            // Dropping the set aborts in-flight fetches and frees their permits
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CycleCancelled),
                joined = set.join_next() => joined,
            };
            let Some(joined) = joined else { break };

            match joined {
                Ok((_, Ok(snapshot))) => snapshots.push(snapshot),
                Ok((symbol, Err(error))) => {
                    metrics::counter!("ignition_symbol_failures_total").increment(1);
                    tracing::warn!(symbol = %symbol, error = %error, "Skipping symbol this cycle");
                    failures.push(SymbolFailure { symbol, error });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Snapshot task failed");
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(CycleCancelled);
        }

        snapshots.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        failures.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok((snapshots, failures))
    }

    /// One full cycle over `symbols`; the report is not published
    ///
    /// When `store` is given, closed short-timeframe bars from each snapshot
    /// are applied to the rolling state before scoring, and every symbol
    /// with enough state history gets a state reading in the report.
    pub async fn run_cycle(
        &self,
        symbols: &[String],
        kind: CycleKind,
        mut store: Option<&mut StateStore>,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, CycleCancelled> {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();

        tracing::info!(cycle_id = %cycle_id, %kind, symbols = symbols.len(), "Cycle started");

        let (snapshots, failures) = self.fetch_snapshots(symbols, cancel).await?;

        let mut results = Vec::new();
        let mut not_ready = Vec::new();
        let mut vetoed = Vec::new();
        let mut state = Vec::new();

        for snapshot in &snapshots {
            if let Some(store) = store.as_deref_mut() {
                ingest_closed_bars(store, snapshot, Utc::now());
                if let Some(reading) = store
                    .get(&snapshot.symbol)
                    .and_then(|s| self.state_extractor.extract_state(&s.snapshot()).ok())
                {
                    state.push(reading);
                }
            }

            let features = match self.extractor.extract(snapshot) {
                Ok(features) => features,
                Err(reason) => {
                    metrics::counter!("ignition_not_ready_total").increment(1);
                    tracing::debug!(symbol = %snapshot.symbol, %reason, "Not enough history");
                    not_ready.push(SymbolNotReady {
                        symbol: snapshot.symbol.clone(),
                        reason,
                    });
                    continue;
                }
            };

            match self.engine.score(&snapshot.symbol, &features, started_at) {
                Decision::Emit(signal) if signal.score > self.settings.scan.min_score => {
                    results.push(signal)
                }
                Decision::Emit(_) | Decision::NoSignal => {}
                Decision::Vetoed => {
                    metrics::counter!("ignition_vetoes_total").increment(1);
                    vetoed.push(snapshot.symbol.clone());
                }
            }
        }

        rank(&mut results);
        metrics::counter!("ignition_signals_total").increment(results.len() as u64);

        let usage = self.limiter.usage().await;
        self.check_budget(&usage);

        let duration = started.elapsed();
        record_cycle(duration, results.len());

        tracing::info!(
            cycle_id = %cycle_id,
            %kind,
            symbols = symbols.len(),
            signals = results.len(),
            failed = failures.len(),
            not_ready = not_ready.len(),
            vetoed = vetoed.len(),
            state = state.len(),
            duration_ms = duration.as_millis() as u64,
            "Cycle complete"
        );

        Ok(CycleReport {
            cycle_id,
            kind,
            started_at,
            duration,
            symbols: symbols.len(),
            results,
            failures,
            not_ready,
            vetoed,
            state,
            usage,
        })
    }

    fn check_budget(&self, usage: &BudgetUsage) {
        record_usage(usage);
        let ceiling = self.settings.weight_ceiling_per_minute as u64;
        if usage.consumed_last_minute > ceiling {
            tracing::warn!(
                consumed = usage.consumed_last_minute,
                ceiling,
                "Request weight over the trailing minute exceeds the ceiling"
            );
        }
    }

    /// Hand a report to every sink
    pub async fn publish(&self, report: &CycleReport) {
        publish_all(&self.sinks, report).await;
    }

    /// Fixed-interval cycles until shutdown or the cycle ceiling
    ///
    /// Cycle starts are `scan.interval` apart; a cycle that overruns its
    /// interval is followed immediately by the next one. Returns the number of completed cycles. An empty or unresolvable
    /// universe at startup is fatal.
    pub async fn run_pull(&self, cancel: &CancellationToken) -> anyhow::Result<u64> {
        let mut universe = self
            .resolve_universe()
            .await
            .context("failed to resolve symbol universe")?;
        anyhow::ensure!(!universe.is_empty(), "resolved symbol universe is empty");

        let mut store = StateStore::new(self.settings.state_capacity);
        store.sync_universe(&universe);

        let scan = &self.settings.scan;
        let refresh = self.settings.universe.refresh_cycles;
        let mut completed = 0u64;

        loop {
            if refresh > 0 && completed > 0 && completed % refresh == 0 {
                match self.resolve_universe().await {
                    Ok(symbols) if !symbols.is_empty() => {
                        store.sync_universe(&symbols);
                        universe = symbols;
                    }
                    Ok(_) => tracing::warn!("Refreshed universe is empty, keeping previous"),
                    Err(FetchError::Cancelled) => break,
                    Err(e) => tracing::warn!(error = %e, "Universe refresh failed, keeping previous"),
                }
            }

            let cycle_start = Instant::now();
            let report = match self
                .run_cycle(&universe, CycleKind::Scan, Some(&mut store), cancel)
                .await
            {
                Ok(report) => report,
                Err(CycleCancelled) => {
                    tracing::info!("Shutdown during cycle, discarding partial results");
                    break;
                }
            };

            self.publish(&report).await;
            completed += 1;

            if scan.cycles > 0 && completed >= scan.cycles {
                tracing::info!(cycles = completed, "Cycle ceiling reached");
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep_until(cycle_start + scan.interval()) => {}
            }
        }

        Ok(completed)
    }
}

async fn fetch_admitted(
    source: &dyn DataSource,
    semaphore: &Semaphore,
    symbol: &str,
    lookback: u16,
) -> Result<Snapshot, FetchError> {
    let _permit = semaphore
        .acquire()
        .await
        .map_err(|_| FetchError::Cancelled)?;
    fetch_snapshot(source, symbol, lookback).await
}

/// Apply every closed bar newer than the last one ingested
fn ingest_closed_bars(store: &mut StateStore, snapshot: &Snapshot, now: DateTime<Utc>) -> usize {
    let bar_length = chrono::Duration::seconds(STATE_TIMEFRAME.duration().as_secs() as i64);
    snapshot
        .spot_5m
        .iter()
        .filter(|bar| bar.open_time + bar_length <= now)
        .filter(|bar| store.ingest(&snapshot.symbol, bar, now) == IngestOutcome::Applied)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Bar;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_symbols() {
        let symbols = strings(&["btcusdt", " ETHUSDT", "BTCUSDT", "", "solusdt"]);
        assert_eq!(
            normalize_symbols(&symbols),
            strings(&["BTCUSDT", "ETHUSDT", "SOLUSDT"])
        );
    }

    #[test]
    fn test_ingest_skips_open_and_stale_bars() {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let bar = |i: i64| Bar {
            open_time: start + chrono::Duration::minutes(5 * i),
            open: Decimal::ONE,
            high: Decimal::ONE,
            low: Decimal::ONE,
            close: Decimal::from(100 + i),
            volume: Decimal::TEN,
            quote_volume: Decimal::TEN,
            taker_buy_base_volume: Decimal::ONE,
        };
        let snapshot = Snapshot {
            symbol: "BTCUSDT".into(),
            spot_1m: Vec::new(),
            spot_5m: (0..4).map(bar).collect(),
            spot_15m: Vec::new(),
            spot_4h: Vec::new(),
            perp_5m: Vec::new(),
            open_interest: Vec::new(),
            funding: Vec::new(),
        };

        let mut store = StateStore::new(10);
        store.sync_universe(&strings(&["BTCUSDT"]));

        // Bar 3 is still open at this instant
        let now = start + chrono::Duration::minutes(17);
        assert_eq!(ingest_closed_bars(&mut store, &snapshot, now), 3);
        assert_eq!(store.get("BTCUSDT").unwrap().last_close(), Some(102.0));

        // Same snapshot again applies nothing
        assert_eq!(ingest_closed_bars(&mut store, &snapshot, now), 0);

        let later = start + chrono::Duration::minutes(30);
        assert_eq!(ingest_closed_bars(&mut store, &snapshot, later), 1);
        assert_eq!(store.get("BTCUSDT").unwrap().len(), 4);
    }
}
