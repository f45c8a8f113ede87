//! Streaming kline feed
//!
//! Delivers confirmed bar closes for the tracked universe over one
//! multiplexed WebSocket connection.

mod binance;
mod types;

pub use binance::{subscribe_frames, BinanceKlineFeed, KlineFeedConfig, BINANCE_STREAM_URL};
pub use types::{Discard, FeedHandle, KlineClose};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Source of bar-close events
#[async_trait]
pub trait KlineFeed: Send + Sync {
    /// Start streaming closes for `symbols` until `cancel` fires
    async fn subscribe(
        &self,
        symbols: &[String],
        cancel: CancellationToken,
    ) -> anyhow::Result<FeedHandle>;
}
