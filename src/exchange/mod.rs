//! Market data acquisition
//!
//! [`DataSource`] abstracts "fetch a typed market-data artifact". The Binance
//! implementation routes every call through the shared rate limiter and the
//! retry policy.

mod binance;
mod error;
mod types;

pub use binance::{
    klines_weight, BinanceClient, BinanceConfig, FUTURES_API_URL, FUTURES_DATA_URL, SPOT_API_URL,
};
pub use error::FetchError;
pub use types::{
    decimal_to_f64, Bar, FundingSample, Market, OpenInterestSample, Snapshot, Timeframe,
};

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Source of symbol metadata and historical series
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Symbols tradable on both the spot and perpetual markets against the
    /// configured quote asset, sorted lexically
    async fn fetch_universe(&self) -> Result<Vec<String>, FetchError>;

    /// Quote-asset symbols with 24h quote volume >= `min_quote_volume`,
    /// highest volume first, at most `n`
    async fn fetch_top_by_volume(
        &self,
        n: usize,
        min_quote_volume: Decimal,
    ) -> Result<Vec<String>, FetchError>;

    /// Most recent `limit` bars, oldest first
    async fn fetch_series(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        market: Market,
        limit: u16,
    ) -> Result<Vec<Bar>, FetchError>;

    /// Open-interest history, oldest first
    async fn fetch_open_interest_history(
        &self,
        symbol: &str,
    ) -> Result<Vec<OpenInterestSample>, FetchError>;

    /// Funding-rate history, oldest first
    async fn fetch_funding_history(&self, symbol: &str) -> Result<Vec<FundingSample>, FetchError>;
}

/// Fetch every series for one symbol concurrently
///
/// Any unrecoverable error drops the whole snapshot; partial snapshots are
/// never returned.
pub async fn fetch_snapshot(
    source: &dyn DataSource,
    symbol: &str,
    lookback: u16,
) -> Result<Snapshot, FetchError> {
    let (spot_1m, spot_5m, spot_15m, spot_4h, perp_5m, open_interest, funding) = tokio::try_join!(
        source.fetch_series(symbol, Timeframe::M1, Market::Spot, lookback),
        source.fetch_series(symbol, Timeframe::M5, Market::Spot, lookback),
        source.fetch_series(symbol, Timeframe::M15, Market::Spot, lookback),
        source.fetch_series(symbol, Timeframe::H4, Market::Spot, lookback),
        source.fetch_series(symbol, Timeframe::M5, Market::Perp, lookback),
        source.fetch_open_interest_history(symbol),
        source.fetch_funding_history(symbol),
    )?;

    Ok(Snapshot {
        symbol: symbol.to_string(),
        spot_1m,
        spot_5m,
        spot_15m,
        spot_4h,
        perp_5m,
        open_interest,
        funding,
    })
}
