//! CLI interface for ignition-screener
//!
//! Provides subcommands for:
//! - `scan`: Fixed-interval pull-mode cycles
//! - `stream`: Streamed bar closes with confirmation scans
//! - `config`: Print the effective configuration

mod scan;
mod stream;

pub use scan::ScanArgs;
pub use stream::StreamArgs;

use crate::config::Config;
use crate::exchange::BinanceClient;
use crate::output::{ConsoleSink, ParquetSink, ResultSink};
use crate::ratelimit::RateLimiter;
use crate::screener::{Screener, ScreenerSettings};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "ignition-screener")]
#[command(about = "Rate-governed momentum screener for Binance spot and perpetual markets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scan cycles on a fixed interval
    Scan(ScanArgs),
    /// Track the universe over the kline stream
    Stream(StreamArgs),
    /// Print the effective configuration
    Config,
}

impl Commands {
    /// Fold command-line overrides into the loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        match self {
            Commands::Scan(args) => args.apply(config),
            Commands::Stream(args) => args.apply(config),
            Commands::Config => {}
        }
    }
}

/// Root token, cancelled on Ctrl-C
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signal = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, shutting down");
                signal.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for interrupt"),
        }
    });
    token
}

/// Wire the shared limiter, exchange client and sinks into a screener
pub(crate) fn build_screener(
    config: &Config,
    cancel: &CancellationToken,
) -> anyhow::Result<Screener> {
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.budget())?);
    let client = BinanceClient::new(
        config.binance(),
        Arc::clone(&limiter),
        config.retry.policy(),
        cancel.clone(),
    )?;

    let mut sinks: Vec<Box<dyn ResultSink>> = vec![Box::new(ConsoleSink::new(config.scan.top_k))];
    if config.output.parquet_enabled {
        let sink = ParquetSink::new(config.output.output_dir.clone());
        sink.ensure_dir()?;
        sinks.push(Box::new(sink));
    }

    Ok(Screener::new(
        Arc::new(client),
        limiter,
        ScreenerSettings::from_config(config),
        sinks,
    ))
}
