//! Scan command implementation

use super::{build_screener, shutdown_token};
use crate::config::{Config, UniverseMode};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Stop after this many cycles (0 = until interrupted)
    #[arg(short = 'n', long)]
    pub cycles: Option<u64>,

    /// Seconds between cycle starts
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Screen only these symbols (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Also write each cycle's results as Parquet under this directory
    #[arg(long)]
    pub parquet: Option<PathBuf>,
}

impl ScanArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(cycles) = self.cycles {
            config.scan.cycles = cycles;
        }
        if let Some(interval) = self.interval {
            config.scan.interval_secs = interval;
        }
        if !self.symbols.is_empty() {
            config.universe.mode = UniverseMode::List;
            config.universe.symbols = self.symbols.clone();
        }
        if let Some(dir) = &self.parquet {
            config.output.parquet_enabled = true;
            config.output.output_dir = dir.clone();
        }
    }

    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let cancel = shutdown_token();
        let screener = build_screener(config, &cancel)?;

        tracing::info!(
            mode = ?config.universe.mode,
            interval_secs = config.scan.interval_secs,
            cycles = config.scan.cycles,
            "Starting scan mode"
        );

        let completed = screener.run_pull(&cancel).await?;
        tracing::info!(cycles = completed, "Scan mode finished");
        Ok(())
    }
}
