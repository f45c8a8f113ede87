//! Push-mode runner: streamed bar closes feed the rolling state, and
//! symbols whose state shows a volume spike get a confirmation scan

use super::{CycleCancelled, CycleKind, CycleReport, Screener};
use crate::config::StreamConfig;
use crate::features::{FeatureExtractor, FeatureParams, StateFeatures};
use crate::feed::{FeedHandle, KlineClose, KlineFeed};
use crate::state::{IngestOutcome, StateSnapshot, StateStore};
use anyhow::Context;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

type CycleOutcome = (CycleKind, Result<CycleReport, CycleCancelled>);

/// What a stream session did before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub closes_applied: u64,
    pub scans: u64,
    pub confirmations: u64,
}

/// State features when they cross the confirmation trigger
pub fn confirmation_trigger(
    extractor: &FeatureExtractor,
    snapshot: &StateSnapshot,
    trigger: f64,
) -> Option<StateFeatures> {
    extractor
        .extract_state(snapshot)
        .ok()
        .filter(|features| features.volume_spike >= trigger)
}

pub struct StreamRunner {
    screener: Screener,
    feed: Arc<dyn KlineFeed>,
    settings: StreamConfig,
    state_extractor: FeatureExtractor,
}

impl StreamRunner {
    pub fn new(screener: Screener, feed: Arc<dyn KlineFeed>, settings: StreamConfig) -> Self {
        let state_extractor = FeatureExtractor::new(FeatureParams {
            min_state_history: settings.min_history,
            ..FeatureParams::default()
        });
        Self {
            screener,
            feed,
            settings,
            state_extractor,
        }
    }

    async fn subscribe(
        &self,
        symbols: &[String],
        cancel: &CancellationToken,
    ) -> anyhow::Result<(FeedHandle, CancellationToken)> {
        let feed_cancel = cancel.child_token();
        let handle = self
            .feed
            .subscribe(symbols, feed_cancel.clone())
            .await
            .context("failed to subscribe to kline feed")?;
        Ok((handle, feed_cancel))
    }

    /// Stream until shutdown, or until `scan.cycles` scheduled scans have
    /// completed when that ceiling is set
    ///
    /// The store is written only from this loop. Scheduled scans and
    /// confirmation scans run as background tasks, at most one of each in
    /// flight; their reports are published as they complete.
    pub async fn run(&self, cancel: &CancellationToken) -> anyhow::Result<StreamSummary> {
        let scan = &self.screener.settings().scan;
        anyhow::ensure!(
            !scan.interval().is_zero(),
            "scan interval must be greater than zero"
        );

        let mut universe = self
            .screener
            .resolve_universe()
            .await
            .context("failed to resolve symbol universe")?;
        anyhow::ensure!(!universe.is_empty(), "resolved symbol universe is empty");

        let mut store = StateStore::new(self.settings.window_capacity);
        store.sync_universe(&universe);

        let (mut feed, mut feed_cancel) = self.subscribe(&universe, cancel).await?;

        let refresh = self.screener.settings().universe.refresh_cycles;

        let mut ticker = interval(scan.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut cycles: JoinSet<CycleOutcome> = JoinSet::new();
        let mut scan_in_flight = false;
        let mut confirm_in_flight = false;
        let mut pending: BTreeSet<String> = BTreeSet::new();
        let mut summary = StreamSummary::default();

        tracing::info!(
            symbols = universe.len(),
            trigger = self.settings.trigger_volume_spike,
            "Stream session started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::info!("Shutdown requested, stopping stream session");
                    break;
                }

                close = feed.klines.recv() => {
                    let Some(close) = close else {
                        feed_cancel.cancel();
                        anyhow::bail!("kline feed ended unexpectedly");
                    };
                    if self.apply_close(&mut store, &close) {
                        summary.closes_applied += 1;
                        self.check_trigger(&store, &close.symbol, &mut pending);
                    }
                }

                Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                    let (kind, result) = match joined {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::error!(error = %e, "Cycle task failed");
                            // A panicked task leaves no way to tell which slot it held
                            scan_in_flight = false;
                            confirm_in_flight = false;
                            continue;
                        }
                    };
                    match kind {
                        CycleKind::Scan => scan_in_flight = false,
                        CycleKind::Confirmation => confirm_in_flight = false,
                    }
                    let Ok(report) = result else { continue };

                    self.screener.publish(&report).await;
                    match kind {
                        CycleKind::Scan => summary.scans += 1,
                        CycleKind::Confirmation => summary.confirmations += 1,
                    }

                    if kind == CycleKind::Scan && scan.cycles > 0 && summary.scans >= scan.cycles {
                        tracing::info!(scans = summary.scans, "Cycle ceiling reached");
                        break;
                    }

                    if kind == CycleKind::Scan
                        && refresh > 0
                        && summary.scans % refresh == 0
                    {
                        if let Some(symbols) = self.refreshed_universe(&universe).await {
                            let change = store.sync_universe(&symbols);
                            pending.retain(|s| store.contains(s));
                            universe = symbols;
                            if !change.is_empty() {
                                feed_cancel.cancel();
                                (feed, feed_cancel) = self.subscribe(&universe, cancel).await?;
                            }
                        }
                    }
                }

                _ = ticker.tick() => {
                    if scan_in_flight {
                        tracing::debug!("Previous scan still running, skipping tick");
                    } else {
                        scan_in_flight = true;
                        self.spawn_cycle(&mut cycles, universe.clone(), CycleKind::Scan, cancel);
                    }
                }
            }

            if !confirm_in_flight && !pending.is_empty() {
                let symbols: Vec<String> = std::mem::take(&mut pending).into_iter().collect();
                tracing::info!(symbols = symbols.len(), "Starting confirmation scan");
                confirm_in_flight = true;
                self.spawn_cycle(&mut cycles, symbols, CycleKind::Confirmation, cancel);
            }
        }

        feed_cancel.cancel();
        cycles.shutdown().await;

        tracing::info!(
            closes = summary.closes_applied,
            scans = summary.scans,
            confirmations = summary.confirmations,
            "Stream session stopped"
        );
        Ok(summary)
    }

    fn apply_close(&self, store: &mut StateStore, close: &KlineClose) -> bool {
        match store.ingest(&close.symbol, &close.bar, close.received_at) {
            IngestOutcome::Applied => {
                metrics::counter!("ignition_stream_closes_total").increment(1);
                true
            }
            outcome => {
                tracing::trace!(symbol = %close.symbol, ?outcome, "Close not applied");
                false
            }
        }
    }

    fn check_trigger(&self, store: &StateStore, symbol: &str, pending: &mut BTreeSet<String>) {
        let Some(state) = store.get(symbol) else {
            return;
        };
        if state.len() < self.settings.min_history {
            return;
        }
        let snapshot = state.snapshot();
        if let Some(features) = confirmation_trigger(
            &self.state_extractor,
            &snapshot,
            self.settings.trigger_volume_spike,
        ) {
            tracing::info!(
                symbol,
                volume_spike = features.volume_spike,
                band_position = features.band_position,
                "Volume spike in stream state"
            );
            pending.insert(symbol.to_string());
        }
    }

    fn spawn_cycle(
        &self,
        cycles: &mut JoinSet<CycleOutcome>,
        symbols: Vec<String>,
        kind: CycleKind,
        cancel: &CancellationToken,
    ) {
        let screener = self.screener.clone();
        let cancel = cancel.clone();
        cycles.spawn(async move {
            let result = screener.run_cycle(&symbols, kind, None, &cancel).await;
            (kind, result)
        });
    }

    async fn refreshed_universe(&self, current: &[String]) -> Option<Vec<String>> {
        match self.screener.resolve_universe().await {
            Ok(symbols) if symbols.is_empty() => {
                tracing::warn!("Refreshed universe is empty, keeping previous");
                None
            }
            Ok(symbols) if symbols == current => None,
            Ok(symbols) => Some(symbols),
            Err(e) => {
                tracing::warn!(error = %e, "Universe refresh failed, keeping previous");
                None
            }
        }
    }
}
