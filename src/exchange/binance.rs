//! Binance spot + USD-M futures REST client

use super::{
    Bar, DataSource, FetchError, FundingSample, Market, OpenInterestSample, Timeframe,
};
use crate::ratelimit::{RateLimiter, RetryPolicy};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Spot REST base URL
pub const SPOT_API_URL: &str = "https://api.binance.com/api/v3";

/// USD-M futures REST base URL
pub const FUTURES_API_URL: &str = "https://fapi.binance.com/fapi/v1";

/// USD-M futures statistics base URL (open-interest history)
pub const FUTURES_DATA_URL: &str = "https://fapi.binance.com/futures/data";

const EXCHANGE_INFO_WEIGHT: u32 = 10;
const TICKER_24H_WEIGHT: u32 = 40;
const OPEN_INTEREST_WEIGHT: u32 = 1;
const FUNDING_WEIGHT: u32 = 1;

/// Longest advisory wait taken from a `Retry-After` header
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Request weight of a klines call for the given limit
pub fn klines_weight(limit: u16) -> u32 {
    match limit {
        0..=99 => 1,
        100..=499 => 2,
        500..=1000 => 5,
        _ => 10,
    }
}

/// Configuration for the Binance client
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub spot_base_url: String,
    pub futures_base_url: String,
    pub futures_data_url: String,
    /// Quote asset every screened symbol must trade against
    pub quote_asset: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Open-interest history sampling period
    pub open_interest_period: Timeframe,
    pub open_interest_limit: u16,
    pub funding_limit: u16,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            spot_base_url: SPOT_API_URL.to_string(),
            futures_base_url: FUTURES_API_URL.to_string(),
            futures_data_url: FUTURES_DATA_URL.to_string(),
            quote_asset: "USDT".to_string(),
            timeout: Duration::from_secs(15),
            open_interest_period: Timeframe::M5,
            open_interest_limit: 200,
            funding_limit: 100,
        }
    }
}

/// Raw kline row: `[openTime, o, h, l, c, v, closeTime, q, trades, V, Q, ignore]`
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    IgnoredAny,
    String,
    IgnoredAny,
    String,
    IgnoredAny,
    IgnoredAny,
);

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    quote_asset: String,
    /// Futures only
    #[serde(default)]
    contract_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: String,
    quote_volume: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOpenInterest {
    sum_open_interest_value: String,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFunding {
    funding_rate: String,
    funding_time: i64,
}

/// Rate-governed Binance REST client
pub struct BinanceClient {
    config: BinanceConfig,
    http: Client,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl BinanceClient {
    /// Create a client that shares `limiter` with every other caller
    pub fn new(
        config: BinanceConfig,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Permanent(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http,
            limiter,
            retry,
            cancel,
        })
    }

    pub fn config(&self) -> &BinanceConfig {
        &self.config
    }

    /// GET with admission control and retries
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        weight: u32,
    ) -> Result<T, FetchError> {
        self.retry
            .run(&self.cancel, || self.get_once(url, query, weight))
            .await
            .map_err(FetchError::from)
    }

    /// One admitted attempt
    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        weight: u32,
    ) -> Result<T, FetchError> {
        self.limiter.acquire(weight).await?;
        metrics::counter!("ignition_requests_total").increment(1);

        tracing::trace!(url, weight, "GET");
        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status, retry_after, &body));
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| FetchError::Permanent(format!("malformed response from {}: {}", url, e)))
    }
}

#[async_trait]
impl DataSource for BinanceClient {
    async fn fetch_universe(&self) -> Result<Vec<String>, FetchError> {
        let spot_url = format!("{}/exchangeInfo", self.config.spot_base_url);
        let futures_url = format!("{}/exchangeInfo", self.config.futures_base_url);

        let (spot, futures) = tokio::try_join!(
            self.get_json::<ExchangeInfo>(&spot_url, &[], EXCHANGE_INFO_WEIGHT),
            self.get_json::<ExchangeInfo>(&futures_url, &[], EXCHANGE_INFO_WEIGHT),
        )?;

        let symbols = cross_listed(&spot, &futures, &self.config.quote_asset);
        tracing::info!(count = symbols.len(), "Discovered cross-listed symbols");
        Ok(symbols)
    }

    async fn fetch_top_by_volume(
        &self,
        n: usize,
        min_quote_volume: Decimal,
    ) -> Result<Vec<String>, FetchError> {
        let url = format!("{}/ticker/24hr", self.config.spot_base_url);
        let tickers: Vec<Ticker24h> = self.get_json(&url, &[], TICKER_24H_WEIGHT).await?;
        Ok(rank_by_quote_volume(
            &tickers,
            &self.config.quote_asset,
            n,
            min_quote_volume,
        ))
    }

    async fn fetch_series(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        market: Market,
        limit: u16,
    ) -> Result<Vec<Bar>, FetchError> {
        let base = match market {
            Market::Spot => &self.config.spot_base_url,
            Market::Perp => &self.config.futures_base_url,
        };
        let url = format!("{}/klines", base);
        let query = [
            ("symbol", symbol.to_string()),
            ("interval", timeframe.as_str().to_string()),
            ("limit", limit.to_string()),
        ];

        let raw: Vec<RawKline> = self.get_json(&url, &query, klines_weight(limit)).await?;
        parse_klines(raw)
    }

    async fn fetch_open_interest_history(
        &self,
        symbol: &str,
    ) -> Result<Vec<OpenInterestSample>, FetchError> {
        let url = format!("{}/openInterestHist", self.config.futures_data_url);
        let query = [
            ("symbol", symbol.to_string()),
            (
                "period",
                self.config.open_interest_period.as_str().to_string(),
            ),
            ("limit", self.config.open_interest_limit.to_string()),
        ];

        let raw: Vec<RawOpenInterest> = self.get_json(&url, &query, OPEN_INTEREST_WEIGHT).await?;
        raw.into_iter()
            .map(|r| {
                Ok(OpenInterestSample {
                    timestamp: millis(r.timestamp)?,
                    value: parse_decimal("sumOpenInterestValue", &r.sum_open_interest_value)?,
                })
            })
            .collect()
    }

    async fn fetch_funding_history(&self, symbol: &str) -> Result<Vec<FundingSample>, FetchError> {
        let url = format!("{}/fundingRate", self.config.futures_base_url);
        let query = [
            ("symbol", symbol.to_string()),
            ("limit", self.config.funding_limit.to_string()),
        ];

        let raw: Vec<RawFunding> = self.get_json(&url, &query, FUNDING_WEIGHT).await?;
        raw.into_iter()
            .map(|r| {
                Ok(FundingSample {
                    timestamp: millis(r.funding_time)?,
                    rate: parse_decimal("fundingRate", &r.funding_rate)?,
                })
            })
            .collect()
    }
}

/// Advisory wait from a `Retry-After` header (seconds)
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| *secs >= 0.0)
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .map_or(MAX_RETRY_AFTER, |wait| wait.min(MAX_RETRY_AFTER))
        })
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, FetchError> {
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .map_err(|_| FetchError::Permanent(format!("invalid {}: {:?}", field, value)))
}

fn millis(ms: i64) -> Result<DateTime<Utc>, FetchError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| FetchError::Permanent(format!("invalid timestamp: {}", ms)))
}

fn parse_klines(raw: Vec<RawKline>) -> Result<Vec<Bar>, FetchError> {
    raw.into_iter()
        .map(|k| {
            Ok(Bar {
                open_time: millis(k.0)?,
                open: parse_decimal("open", &k.1)?,
                high: parse_decimal("high", &k.2)?,
                low: parse_decimal("low", &k.3)?,
                close: parse_decimal("close", &k.4)?,
                volume: parse_decimal("volume", &k.5)?,
                quote_volume: parse_decimal("quoteVolume", &k.7)?,
                taker_buy_base_volume: parse_decimal("takerBuyBaseVolume", &k.9)?,
            })
        })
        .collect()
}

/// Symbols trading on spot and as a perpetual against `quote_asset`
fn cross_listed(spot: &ExchangeInfo, futures: &ExchangeInfo, quote_asset: &str) -> Vec<String> {
    let spot_symbols: BTreeSet<&str> = spot
        .symbols
        .iter()
        .filter(|s| s.status == "TRADING" && s.quote_asset == quote_asset)
        .map(|s| s.symbol.as_str())
        .collect();

    futures
        .symbols
        .iter()
        .filter(|s| {
            s.status == "TRADING"
                && s.quote_asset == quote_asset
                && s.contract_type.as_deref() == Some("PERPETUAL")
        })
        .map(|s| s.symbol.as_str())
        .filter(|s| spot_symbols.contains(s))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Highest 24h quote volume first, ties broken by symbol
fn rank_by_quote_volume(
    tickers: &[Ticker24h],
    quote_asset: &str,
    n: usize,
    min_quote_volume: Decimal,
) -> Vec<String> {
    let mut ranked: Vec<(Decimal, &str)> = tickers
        .iter()
        .filter(|t| t.symbol.ends_with(quote_asset))
        .filter_map(|t| {
            let volume = Decimal::from_str(&t.quote_volume).ok()?;
            (volume >= min_quote_volume).then_some((volume, t.symbol.as_str()))
        })
        .collect();

    ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    ranked
        .into_iter()
        .take(n)
        .map(|(_, symbol)| symbol.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RateBudget;
    use reqwest::header::HeaderValue;
    use rust_decimal_macros::dec;

    const KLINES: &str = r#"[
        [1499040000000, "0.01634790", "0.80000000", "0.01575800", "0.01577100",
         "148976.11427815", 1499644799999, "2434.19055334", 308,
         "1756.87402397", "28.46694368", "0"]
    ]"#;

    #[test]
    fn test_klines_weight() {
        assert_eq!(klines_weight(50), 1);
        assert_eq!(klines_weight(200), 2);
        assert_eq!(klines_weight(1000), 5);
        assert_eq!(klines_weight(1500), 10);
    }

    #[test]
    fn test_parse_klines() {
        let raw: Vec<RawKline> = serde_json::from_str(KLINES).unwrap();
        let bars = parse_klines(raw).unwrap();

        assert_eq!(bars.len(), 1);
        let bar = &bars[0];
        assert_eq!(bar.open_time.timestamp_millis(), 1499040000000);
        assert_eq!(bar.high, dec!(0.80000000));
        assert_eq!(bar.close, dec!(0.01577100));
        assert_eq!(bar.quote_volume, dec!(2434.19055334));
        assert_eq!(bar.taker_buy_base_volume, dec!(1756.87402397));
    }

    #[test]
    fn test_parse_klines_invalid_price() {
        let json = r#"[[1499040000000, "abc", "1", "1", "1", "1", 1, "1", 1, "1", "1", "0"]]"#;
        let raw: Vec<RawKline> = serde_json::from_str(json).unwrap();
        assert!(matches!(parse_klines(raw), Err(FetchError::Permanent(_))));
    }

    #[test]
    fn test_parse_decimal_scientific() {
        assert_eq!(parse_decimal("x", "1.5e3").unwrap(), dec!(1500));
        assert!(parse_decimal("x", "").is_err());
    }

    #[test]
    fn test_cross_listed() {
        let spot: ExchangeInfo = serde_json::from_str(
            r#"{"symbols": [
                {"symbol": "BTCUSDT", "status": "TRADING", "quoteAsset": "USDT"},
                {"symbol": "ETHUSDT", "status": "TRADING", "quoteAsset": "USDT"},
                {"symbol": "ETHBTC", "status": "TRADING", "quoteAsset": "BTC"},
                {"symbol": "LUNAUSDT", "status": "BREAK", "quoteAsset": "USDT"}
            ]}"#,
        )
        .unwrap();
        let futures: ExchangeInfo = serde_json::from_str(
            r#"{"symbols": [
                {"symbol": "ETHUSDT", "status": "TRADING", "quoteAsset": "USDT", "contractType": "PERPETUAL"},
                {"symbol": "BTCUSDT", "status": "TRADING", "quoteAsset": "USDT", "contractType": "PERPETUAL"},
                {"symbol": "BTCUSDT_240927", "status": "TRADING", "quoteAsset": "USDT", "contractType": "CURRENT_QUARTER"},
                {"symbol": "LUNAUSDT", "status": "TRADING", "quoteAsset": "USDT", "contractType": "PERPETUAL"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(cross_listed(&spot, &futures, "USDT"), vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[test]
    fn test_rank_by_quote_volume() {
        let tickers: Vec<Ticker24h> = serde_json::from_str(
            r#"[
                {"symbol": "BTCUSDT", "quoteVolume": "900000000"},
                {"symbol": "ETHUSDT", "quoteVolume": "500000000"},
                {"symbol": "ETHBTC", "quoteVolume": "999999999999"},
                {"symbol": "DOGEUSDT", "quoteVolume": "1000"},
                {"symbol": "SOLUSDT", "quoteVolume": "700000000"}
            ]"#,
        )
        .unwrap();

        let top = rank_by_quote_volume(&tickers, "USDT", 2, dec!(0));
        assert_eq!(top, vec!["BTCUSDT", "SOLUSDT"]);

        let floored = rank_by_quote_volume(&tickers, "USDT", 10, dec!(100000));
        assert_eq!(floored, vec!["BTCUSDT", "SOLUSDT", "ETHUSDT"]);
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(30)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("-5"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("NaN"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("1e20"));
        assert_eq!(parse_retry_after(&headers), Some(MAX_RETRY_AFTER));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("inf"));
        assert_eq!(parse_retry_after(&headers), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_client_creation() {
        let limiter = Arc::new(RateLimiter::new(RateBudget::per_minute(1200, 1200)).unwrap());
        let client = BinanceClient::new(
            BinanceConfig::default(),
            limiter,
            RetryPolicy::default(),
            CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(client.config().quote_asset, "USDT");
    }
}
