//! Console table sink

use super::ResultSink;
use crate::screener::CycleReport;
use async_trait::async_trait;
use std::fmt::Write;

/// Prints the top-K ranked signals and the rate budget
pub struct ConsoleSink {
    top_k: usize,
}

impl ConsoleSink {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }
}

fn price(value: f64) -> String {
    if value.abs() >= 1.0 {
        format!("{:.4}", value)
    } else {
        format!("{:.8}", value)
    }
}

/// Ranked table of the first `top_k` results
pub fn render_table(report: &CycleReport, top_k: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Ignition {} {} | {} symbols, {} signals, {} failed, {} not ready, {} vetoed | budget {}/{} used last minute",
        report.kind,
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.symbols,
        report.results.len(),
        report.failures.len(),
        report.not_ready.len(),
        report.vetoed.len(),
        report.usage.consumed_last_minute,
        report.usage.capacity,
    );

    let strongest = report
        .state
        .iter()
        .max_by(|a, b| a.volume_spike.total_cmp(&b.volume_spike));
    if let Some(reading) = strongest {
        let _ = writeln!(
            out,
            "State: {} symbols read, strongest volume spike {} {:.2}x",
            report.state.len(),
            reading.symbol,
            reading.volume_spike,
        );
    }

    if report.results.is_empty() {
        let _ = writeln!(out, "No ignition candidates");
        return out;
    }

    let _ = writeln!(
        out,
        "{:>3}  {:<14} {:>6}  {:<9} {:>14} {:>14} {:>14} {:>14} {:>14}  {}",
        "#", "SYMBOL", "SCORE", "PATH", "ENTRY", "STOP", "TP1", "TP2", "TP3", "REASONS"
    );
    for (rank, signal) in report.results.iter().take(top_k).enumerate() {
        let levels = &signal.levels;
        let _ = writeln!(
            out,
            "{:>3}  {:<14} {:>6.1}  {:<9} {:>14} {:>14} {:>14} {:>14} {:>14}  {}",
            rank + 1,
            signal.symbol,
            signal.score,
            signal.path.as_str(),
            price(levels.entry),
            price(levels.stop),
            price(levels.tp1),
            price(levels.tp2),
            price(levels.tp3),
            signal.reason_string(),
        );
    }
    out
}

#[async_trait]
impl ResultSink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn publish(&self, report: &CycleReport) -> anyhow::Result<()> {
        println!("{}", render_table(report, self.top_k));
        Ok(())
    }
}
