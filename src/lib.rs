//! ignition-screener: momentum screener for Binance spot and perpetual markets
//!
//! This library provides the core components for:
//! - Rate-governed market data acquisition with retry and backoff
//! - Per-symbol rolling state fed by polling or the kline stream
//! - Deterministic feature extraction and ignition scoring
//! - Ranked results to the console and Parquet
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod exchange;
pub mod features;
pub mod feed;
pub mod output;
pub mod ratelimit;
pub mod scoring;
pub mod screener;
pub mod state;
pub mod telemetry;
pub mod ws;
