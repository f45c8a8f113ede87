//! Stream command implementation

use super::{build_screener, shutdown_token};
use crate::config::{Config, UniverseMode};
use crate::feed::BinanceKlineFeed;
use crate::screener::StreamRunner;
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Track only these symbols (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// State volume spike that triggers a confirmation scan
    #[arg(short, long)]
    pub trigger: Option<f64>,
}

impl StreamArgs {
    pub fn apply(&self, config: &mut Config) {
        if !self.symbols.is_empty() {
            config.universe.mode = UniverseMode::List;
            config.universe.symbols = self.symbols.clone();
        }
        if let Some(trigger) = self.trigger {
            config.stream.trigger_volume_spike = trigger;
        }
    }

    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let cancel = shutdown_token();
        let screener = build_screener(config, &cancel)?;
        let feed = Arc::new(BinanceKlineFeed::new(config.kline_feed()));

        tracing::info!(
            mode = ?config.universe.mode,
            interval = %config.stream.interval,
            "Starting stream mode"
        );

        let runner = StreamRunner::new(screener, feed, config.stream.clone());
        let summary = runner.run(&cancel).await?;
        tracing::info!(?summary, "Stream mode finished");
        Ok(())
    }
}
