//! Binance combined-stream kline feed

use super::{Discard, FeedHandle, KlineClose, KlineFeed};
use crate::exchange::{Bar, Timeframe};
use crate::ws::{WsClient, WsConfig, WsMessage};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Binance combined stream endpoint
pub const BINANCE_STREAM_URL: &str = "wss://stream.binance.com:9443/stream";

/// Most streams accepted in one SUBSCRIBE request
const MAX_STREAMS_PER_FRAME: usize = 200;

/// Combined-stream wrapper `{"stream": .., "data": ..}`
#[derive(Debug, Deserialize)]
struct CombinedFrame {
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct KlineEvent {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "k")]
    kline: KlinePayload,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    /// Bar open time (ms)
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "i")]
    interval: String,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "q")]
    quote_volume: String,
    #[serde(rename = "V")]
    taker_buy_base_volume: String,
    /// Whether this update closes the bar
    #[serde(rename = "x")]
    closed: bool,
}

#[derive(Debug, Clone)]
pub struct KlineFeedConfig {
    pub url: String,
    pub interval: Timeframe,
    pub reconnect_floor: Duration,
    pub reconnect_cap: Duration,
    pub stable_after: Duration,
}

impl Default for KlineFeedConfig {
    fn default() -> Self {
        Self {
            url: BINANCE_STREAM_URL.to_string(),
            interval: Timeframe::M5,
            reconnect_floor: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(30),
            stable_after: Duration::from_secs(10),
        }
    }
}

/// SUBSCRIBE requests covering every symbol's kline stream
pub fn subscribe_frames(symbols: &[String], interval: Timeframe) -> Vec<String> {
    let streams: Vec<String> = symbols
        .iter()
        .map(|s| format!("{}@kline_{}", s.to_lowercase(), interval.as_str()))
        .collect();

    streams
        .chunks(MAX_STREAMS_PER_FRAME)
        .enumerate()
        .map(|(i, chunk)| {
            serde_json::json!({
                "method": "SUBSCRIBE",
                "params": chunk,
                "id": i + 1,
            })
            .to_string()
        })
        .collect()
}

/// Kline-close feed over the Binance combined stream
pub struct BinanceKlineFeed {
    config: KlineFeedConfig,
}

impl BinanceKlineFeed {
    pub fn new(config: KlineFeedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KlineFeedConfig {
        &self.config
    }

    /// Parse one text frame into a closed bar for `interval`
    fn parse_message(msg: &str, interval: Timeframe) -> Result<KlineClose, Discard> {
        let frame: CombinedFrame = serde_json::from_str(msg).map_err(|_| Discard::Malformed)?;

        if frame.data.get("e").and_then(|e| e.as_str()) != Some("kline") {
            return Err(Discard::NotKline);
        }

        let event: KlineEvent =
            serde_json::from_value(frame.data).map_err(|_| Discard::Malformed)?;
        let k = event.kline;

        if k.interval != interval.as_str() {
            return Err(Discard::IntervalMismatch);
        }
        if !k.closed {
            return Err(Discard::Unclosed);
        }

        let decimal = |s: &str| Decimal::from_str(s).map_err(|_| Discard::Malformed);
        let bar = Bar {
            open_time: Utc
                .timestamp_millis_opt(k.open_time)
                .single()
                .ok_or(Discard::Malformed)?,
            open: decimal(&k.open)?,
            high: decimal(&k.high)?,
            low: decimal(&k.low)?,
            close: decimal(&k.close)?,
            volume: decimal(&k.volume)?,
            quote_volume: decimal(&k.quote_volume)?,
            taker_buy_base_volume: decimal(&k.taker_buy_base_volume)?,
        };

        Ok(KlineClose {
            symbol: event.symbol,
            interval,
            bar,
            received_at: Utc::now(),
        })
    }

    /// Forward closes for tracked symbols, in arrival order
    async fn run_message_loop(
        mut ws_rx: mpsc::Receiver<WsMessage>,
        kline_tx: mpsc::Sender<KlineClose>,
        tracked: HashSet<String>,
        interval: Timeframe,
    ) {
        while let Some(msg) = ws_rx.recv().await {
            match msg {
                WsMessage::Text(text) => {
                    let result = Self::parse_message(&text, interval).and_then(|close| {
                        if tracked.contains(&close.symbol) {
                            Ok(close)
                        } else {
                            Err(Discard::Untracked)
                        }
                    });
                    match result {
                        Ok(close) => {
                            if kline_tx.send(close).await.is_err() {
                                tracing::debug!("Kline receiver dropped, stopping feed");
                                break;
                            }
                        }
                        Err(reason) => {
                            metrics::counter!(
                                "ignition_stream_frames_discarded_total",
                                "reason" => reason.as_str()
                            )
                            .increment(1);
                            tracing::trace!(%reason, "Discarded stream frame");
                        }
                    }
                }
                WsMessage::Connected => {
                    tracing::info!(symbols = tracked.len(), "Kline feed connected");
                }
                WsMessage::Disconnected => {
                    tracing::warn!("Kline feed disconnected");
                }
                WsMessage::Reconnecting { attempt, delay } => {
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Kline feed reconnecting"
                    );
                }
                WsMessage::Binary(_) => {}
            }
        }
    }
}

#[async_trait]
impl KlineFeed for BinanceKlineFeed {
    async fn subscribe(
        &self,
        symbols: &[String],
        cancel: CancellationToken,
    ) -> anyhow::Result<FeedHandle> {
        anyhow::ensure!(!symbols.is_empty(), "no symbols to subscribe");

        let (kline_tx, kline_rx) = mpsc::channel(1024);
        let interval = self.config.interval;

        tracing::info!(
            symbols = symbols.len(),
            interval = %interval,
            "Subscribing to kline stream"
        );

        let config = WsConfig::new(self.config.url.clone())
            .initial_delay(self.config.reconnect_floor)
            .max_delay(self.config.reconnect_cap)
            .stable_after(self.config.stable_after)
            .subscriptions(subscribe_frames(symbols, interval));

        let ws = WsClient::new(config).connect(cancel);
        let tracked: HashSet<String> = symbols.iter().map(|s| s.to_uppercase()).collect();

        tokio::spawn(Self::run_message_loop(ws.messages, kline_tx, tracked, interval));

        Ok(FeedHandle {
            klines: kline_rx,
            state: ws.state,
        })
    }
}
