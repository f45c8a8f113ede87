//! Result sinks
//!
//! Every completed cycle is handed to each configured [`ResultSink`]. Sink
//! failures are logged by the caller and never stop the screener.

mod console;
mod parquet;

pub use console::{render_table, ConsoleSink};
pub use parquet::{signal_schema, write_signals, ParquetSink};

use crate::screener::CycleReport;
use async_trait::async_trait;

/// Consumer of ranked cycle results
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    async fn publish(&self, report: &CycleReport) -> anyhow::Result<()>;
}

/// Publish to every sink, logging failures
pub async fn publish_all(sinks: &[Box<dyn ResultSink>], report: &CycleReport) {
    for sink in sinks {
        if let Err(e) = sink.publish(report).await {
            tracing::error!(
                sink = sink.name(),
                cycle_id = %report.cycle_id,
                error = %e,
                "Sink failed to publish cycle"
            );
        }
    }
}
