//! Configuration file tests

use ignition_screener::config::{Config, UniverseMode};
use ignition_screener::exchange::Timeframe;
use std::io::Write;
use std::time::Duration;

#[test]
fn test_example_config_loads_and_validates() {
    let config: Config = toml::from_str(include_str!("../config.toml.example")).unwrap();
    tokio_test::assert_ok!(config.validate());

    assert_eq!(config.universe.mode, UniverseMode::Top);
    assert_eq!(config.scan.max_concurrency, 6);
    assert_eq!(config.scan.interval(), Duration::from_secs(300));
    assert_eq!(config.rate_limit.capacity, 1200);
    assert_eq!(config.stream.interval, Timeframe::M5);
    assert!(config.telemetry.metrics_port.is_none());
}

#[test]
fn test_config_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [universe]
        mode = "list"
        symbols = ["BTCUSDT", "ETHUSDT"]

        [telemetry]
        log_level = "debug"
        "#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.universe.mode, UniverseMode::List);
    assert_eq!(config.universe.symbols.len(), 2);
    assert!(config.validate().is_ok());
}

#[test]
fn test_effective_config_round_trips_through_toml() {
    let config: Config = toml::from_str(include_str!("../config.toml.example")).unwrap();
    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed: Config = toml::from_str(&rendered).unwrap();

    assert_eq!(reparsed.universe.top_n, config.universe.top_n);
    assert_eq!(reparsed.universe.min_quote_volume, config.universe.min_quote_volume);
    assert_eq!(reparsed.exchange.spot_url, config.exchange.spot_url);
}

#[test]
fn test_missing_telemetry_section_rejected() {
    tokio_test::assert_err!(toml::from_str::<Config>("[scan]\ncycles = 1"));
}
