//! Configuration types for ignition-screener

use crate::exchange::{BinanceConfig, Timeframe};
use crate::features::FeatureParams;
use crate::feed::KlineFeedConfig;
use crate::ratelimit::{RateBudget, RetryPolicy};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub universe: UniverseConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub output: OutputConfig,
    pub telemetry: TelemetryConfig,
}

/// Exchange endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_spot_url")]
    pub spot_url: String,
    #[serde(default = "default_futures_url")]
    pub futures_url: String,
    #[serde(default = "default_futures_data_url")]
    pub futures_data_url: String,
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_spot_url() -> String {
    crate::exchange::SPOT_API_URL.to_string()
}
fn default_futures_url() -> String {
    crate::exchange::FUTURES_API_URL.to_string()
}
fn default_futures_data_url() -> String {
    crate::exchange::FUTURES_DATA_URL.to_string()
}
fn default_stream_url() -> String {
    crate::feed::BINANCE_STREAM_URL.to_string()
}
fn default_quote_asset() -> String {
    "USDT".to_string()
}
fn default_timeout_secs() -> u64 {
    15
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            spot_url: default_spot_url(),
            futures_url: default_futures_url(),
            futures_data_url: default_futures_data_url(),
            stream_url: default_stream_url(),
            quote_asset: default_quote_asset(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// How the symbol universe is chosen
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UniverseMode {
    /// Every cross-listed spot/perp symbol
    #[default]
    All,
    /// Top-N cross-listed symbols by 24h quote volume
    Top,
    /// Explicit symbol list
    List,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UniverseConfig {
    #[serde(default)]
    pub mode: UniverseMode,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// 24h quote-volume floor for `top` mode
    #[serde(default)]
    pub min_quote_volume: Decimal,
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Re-resolve every N cycles (0 = never)
    #[serde(default)]
    pub refresh_cycles: u64,
}

fn default_top_n() -> usize {
    50
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            mode: UniverseMode::All,
            top_n: default_top_n(),
            min_quote_volume: Decimal::ZERO,
            symbols: Vec::new(),
            refresh_cycles: 0,
        }
    }
}

/// Pull-mode cycle settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Cycle ceiling (0 = run until shutdown)
    #[serde(default)]
    pub cycles: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Bars requested per series
    #[serde(default = "default_lookback_bars")]
    pub lookback_bars: u16,
    /// Rows shown by the console sink
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Signals scoring at or below this are dropped
    #[serde(default)]
    pub min_score: f64,
}

fn default_interval_secs() -> u64 {
    300
}
fn default_max_concurrency() -> usize {
    6
}
fn default_lookback_bars() -> u16 {
    200
}
fn default_top_k() -> usize {
    10
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            cycles: 0,
            max_concurrency: default_max_concurrency(),
            lookback_bars: default_lookback_bars(),
            top_k: default_top_k(),
            min_score: 0.0,
        }
    }
}

impl ScanConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Token-bucket parameters, in request weight
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_weight_per_minute")]
    pub capacity: u32,
    #[serde(default = "default_weight_per_minute")]
    pub refill_per_minute: u32,
    /// Trailing-minute weight that triggers a warning
    #[serde(default = "default_weight_per_minute")]
    pub weight_ceiling_per_minute: u32,
}

fn default_weight_per_minute() -> u32 {
    1200
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_weight_per_minute(),
            refill_per_minute: default_weight_per_minute(),
            weight_ceiling_per_minute: default_weight_per_minute(),
        }
    }
}

impl RateLimitConfig {
    pub fn budget(&self) -> RateBudget {
        RateBudget::per_minute(self.capacity, self.refill_per_minute)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Wait used when a rate-limit response has no Retry-After
    #[serde(default = "default_retry_after_secs")]
    pub default_retry_after_secs: u64,
}

fn default_max_attempts() -> u32 {
    4
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    20_000
}
fn default_retry_after_secs() -> u64 {
    60
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            default_retry_after_secs: default_retry_after_secs(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            default_retry_after: Duration::from_secs(self.default_retry_after_secs),
        }
    }
}

/// Push-mode settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    #[serde(default = "default_stream_interval")]
    pub interval: Timeframe,
    /// Closes retained per symbol
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
    #[serde(default = "default_reconnect_floor_ms")]
    pub reconnect_floor_ms: u64,
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,
    /// Connections lasting this long reset the reconnect backoff
    #[serde(default = "default_stable_after_secs")]
    pub stable_after_secs: u64,
    /// State volume spike that triggers a confirmation scan
    #[serde(default = "default_trigger_volume_spike")]
    pub trigger_volume_spike: f64,
    /// Closes required before a symbol's state is evaluated
    #[serde(default = "default_min_history")]
    pub min_history: usize,
}

fn default_stream_interval() -> Timeframe {
    Timeframe::M5
}
fn default_window_capacity() -> usize {
    200
}
fn default_reconnect_floor_ms() -> u64 {
    1000
}
fn default_reconnect_cap_ms() -> u64 {
    30_000
}
fn default_stable_after_secs() -> u64 {
    10
}
fn default_trigger_volume_spike() -> f64 {
    2.5
}
fn default_min_history() -> usize {
    22
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval: default_stream_interval(),
            window_capacity: default_window_capacity(),
            reconnect_floor_ms: default_reconnect_floor_ms(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
            stable_after_secs: default_stable_after_secs(),
            trigger_volume_spike: default_trigger_volume_spike(),
            min_history: default_min_history(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub parquet_enabled: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            parquet_enabled: false,
            output_dir: default_output_dir(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    /// Prometheus scrape port; no exporter when absent
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// Unrecoverable configuration problems
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("rate_limit.{0} must be greater than zero")]
    ZeroRate(&'static str),

    #[error("scan.max_concurrency must be greater than zero")]
    ZeroConcurrency,

    #[error("scan.lookback_bars must be greater than zero")]
    ZeroLookback,

    #[error("retry.max_attempts must be greater than zero")]
    ZeroAttempts,

    #[error("retry.base_delay_ms ({base}) exceeds retry.max_delay_ms ({max})")]
    RetryDelayOrder { base: u64, max: u64 },

    #[error("stream.reconnect_floor_ms ({floor}) exceeds stream.reconnect_cap_ms ({cap})")]
    ReconnectDelayOrder { floor: u64, cap: u64 },

    #[error("scan.interval_secs must be greater than zero")]
    ZeroInterval,

    #[error("stream.window_capacity ({capacity}) must hold at least {need} closes")]
    WindowTooSmall { capacity: usize, need: usize },

    #[error("universe.mode = \"list\" requires universe.symbols")]
    EmptySymbolList,

    #[error("universe.top_n must be greater than zero")]
    ZeroTopN,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Reject settings the screener cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.capacity == 0 {
            return Err(ConfigError::ZeroRate("capacity"));
        }
        if self.rate_limit.refill_per_minute == 0 {
            return Err(ConfigError::ZeroRate("refill_per_minute"));
        }
        if self.scan.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.scan.interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.scan.lookback_bars == 0 {
            return Err(ConfigError::ZeroLookback);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::RetryDelayOrder {
                base: self.retry.base_delay_ms,
                max: self.retry.max_delay_ms,
            });
        }
        if self.stream.reconnect_floor_ms > self.stream.reconnect_cap_ms {
            return Err(ConfigError::ReconnectDelayOrder {
                floor: self.stream.reconnect_floor_ms,
                cap: self.stream.reconnect_cap_ms,
            });
        }
        let need = self.state_params().state_history_needed();
        if self.stream.window_capacity < need {
            return Err(ConfigError::WindowTooSmall {
                capacity: self.stream.window_capacity,
                need,
            });
        }
        match self.universe.mode {
            UniverseMode::List if self.universe.symbols.is_empty() => {
                return Err(ConfigError::EmptySymbolList)
            }
            UniverseMode::Top if self.universe.top_n == 0 => return Err(ConfigError::ZeroTopN),
            _ => {}
        }
        Ok(())
    }

    /// Feature windows used on rolling state
    pub fn state_params(&self) -> FeatureParams {
        FeatureParams {
            min_state_history: self.stream.min_history,
            ..FeatureParams::default()
        }
    }

    pub fn binance(&self) -> BinanceConfig {
        BinanceConfig {
            spot_base_url: self.exchange.spot_url.clone(),
            futures_base_url: self.exchange.futures_url.clone(),
            futures_data_url: self.exchange.futures_data_url.clone(),
            quote_asset: self.exchange.quote_asset.clone(),
            timeout: Duration::from_secs(self.exchange.timeout_secs),
            ..BinanceConfig::default()
        }
    }

    pub fn kline_feed(&self) -> KlineFeedConfig {
        KlineFeedConfig {
            url: self.exchange.stream_url.clone(),
            interval: self.stream.interval,
            reconnect_floor: Duration::from_millis(self.stream.reconnect_floor_ms),
            reconnect_cap: Duration::from_millis(self.stream.reconnect_cap_ms),
            stable_after: Duration::from_secs(self.stream.stable_after_secs),
        }
    }
}
