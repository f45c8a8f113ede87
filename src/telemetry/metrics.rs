//! Prometheus metrics

use crate::ratelimit::BudgetUsage;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Tokens currently in the bucket
    AvailableTokens,
    /// Weight debited in the trailing minute
    ConsumedLastMinute,
    /// Ranked signals in the last cycle
    LastCycleSignals,
}

impl GaugeMetric {
    fn name(&self) -> &'static str {
        match self {
            GaugeMetric::AvailableTokens => "ignition_limiter_available_tokens",
            GaugeMetric::ConsumedLastMinute => "ignition_limiter_consumed_last_minute",
            GaugeMetric::LastCycleSignals => "ignition_last_cycle_signals",
        }
    }
}

/// Serve `/metrics` on `0.0.0.0:port`
pub fn install_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

/// Export the rate budget summary
pub fn record_usage(usage: &BudgetUsage) {
    set_gauge(GaugeMetric::AvailableTokens, usage.available);
    set_gauge(
        GaugeMetric::ConsumedLastMinute,
        usage.consumed_last_minute as f64,
    );
}

/// Record one completed cycle
pub fn record_cycle(duration: Duration, signals: usize) {
    metrics::histogram!("ignition_cycle_duration_seconds").record(duration.as_secs_f64());
    set_gauge(GaugeMetric::LastCycleSignals, signals as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_names_are_prefixed() {
        for metric in [
            GaugeMetric::AvailableTokens,
            GaugeMetric::ConsumedLastMinute,
            GaugeMetric::LastCycleSignals,
        ] {
            assert!(metric.name().starts_with("ignition_"));
        }
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_usage(&BudgetUsage {
            capacity: 1200.0,
            available: 800.0,
            consumed_total: 400,
            consumed_last_minute: 400,
        });
        record_cycle(Duration::from_millis(1500), 3);
    }
}
