//! Integration tests for the screening cycle

mod common;

use common::{list_settings, screener, symbols, MockSource, Profile, RecordingSink};
use ignition_screener::config::UniverseMode;
use ignition_screener::exchange::FetchError;
use ignition_screener::scoring::{Path, ReasonCode};
use ignition_screener::screener::{CycleCancelled, CycleKind};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn mixed_source() -> Arc<MockSource> {
    Arc::new(MockSource::new(&[
        ("WINUSDT", Profile::SpotLed { spike: 4 }),
        ("FLATUSDT", Profile::Flat),
        ("SHORTUSDT", Profile::Short),
        ("FAILUSDT", Profile::Failing),
        ("HOTUSDT", Profile::Overextended),
    ]))
}

#[tokio::test]
async fn test_cycle_isolates_failures_and_classifies_symbols() {
    let sink = RecordingSink::default();
    let all = ["WINUSDT", "FLATUSDT", "SHORTUSDT", "FAILUSDT", "HOTUSDT"];
    let screener = screener(mixed_source(), list_settings(&all), &sink);

    let report = screener
        .run_cycle(&symbols(&all), CycleKind::Scan, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.kind, CycleKind::Scan);
    assert_eq!(report.symbols, 5);
    assert_eq!(report.scored(), 4);

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].symbol, "FAILUSDT");
    assert!(matches!(report.failures[0].error, FetchError::Permanent(_)));

    assert_eq!(report.not_ready.len(), 1);
    assert_eq!(report.not_ready[0].symbol, "SHORTUSDT");
    assert_eq!(report.not_ready[0].reason.series, "spot_5m");

    assert_eq!(report.vetoed, vec!["HOTUSDT".to_string()]);

    assert_eq!(report.results.len(), 1);
    let signal = &report.results[0];
    assert_eq!(signal.symbol, "WINUSDT");
    assert_eq!(signal.path, Path::SpotLed);
    assert_eq!(signal.reasons, vec![ReasonCode::SpotLedVolumeSpike]);
    assert!(signal.score > 60.0 && signal.score < 63.0);
    assert_eq!(signal.levels.entry, 103.0);
    assert!(signal.levels.stop < signal.levels.entry);

    // run_cycle alone never publishes
    assert!(sink.reports().is_empty());
    // No store, no state readings
    assert!(report.state.is_empty());
}

#[tokio::test]
async fn test_results_ranked_by_score() {
    let source = Arc::new(MockSource::new(&[
        ("AAAUSDT", Profile::SpotLed { spike: 4 }),
        ("BIGUSDT", Profile::SpotLed { spike: 8 }),
        ("CCCUSDT", Profile::SpotLed { spike: 4 }),
    ]));
    let sink = RecordingSink::default();
    let all = ["CCCUSDT", "AAAUSDT", "BIGUSDT"];
    let screener = screener(source, list_settings(&all), &sink);

    let report = screener
        .run_cycle(&symbols(&all), CycleKind::Scan, None, &CancellationToken::new())
        .await
        .unwrap();

    let ranked: Vec<&str> = report.results.iter().map(|s| s.symbol.as_str()).collect();
    // Equal scores fall back to symbol order
    assert_eq!(ranked, vec!["BIGUSDT", "AAAUSDT", "CCCUSDT"]);
}

#[tokio::test]
async fn test_min_score_filters_results() {
    let sink = RecordingSink::default();
    let mut settings = list_settings(&["WINUSDT"]);
    settings.scan.min_score = 75.0;
    let screener = screener(mixed_source(), settings, &sink);

    let report = screener
        .run_cycle(&symbols(&["WINUSDT"]), CycleKind::Scan, None, &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.results.is_empty());
}

#[tokio::test]
async fn test_concurrency_bound() {
    let names: Vec<String> = (0..8).map(|i| format!("S{i}USDT")).collect();
    let profiles: Vec<(&str, Profile)> = names.iter().map(|s| (s.as_str(), Profile::Flat)).collect();
    let source = Arc::new(MockSource::new(&profiles));

    let sink = RecordingSink::default();
    let mut settings = list_settings(&[]);
    settings.scan.max_concurrency = 2;
    let screener = screener(Arc::clone(&source), settings, &sink);

    let report = screener
        .run_cycle(&names, CycleKind::Scan, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.scored(), 8);
    let peak = source.max_active.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 2, "peak concurrency {peak}");
}

#[tokio::test]
async fn test_cancel_interrupts_cycle() {
    let source = Arc::new(MockSource::new(&[
        ("WINUSDT", Profile::SpotLed { spike: 4 }),
        ("SLOWUSDT", Profile::Hanging),
    ]));
    let sink = RecordingSink::default();
    let all = ["WINUSDT", "SLOWUSDT"];
    let screener = screener(source, list_settings(&all), &sink);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        screener.run_cycle(&symbols(&all), CycleKind::Scan, None, &cancel),
    )
    .await
    .expect("cancellation should end the cycle");

    assert_eq!(result.unwrap_err(), CycleCancelled);
}

#[tokio::test]
async fn test_run_pull_publishes_each_cycle() {
    let sink = RecordingSink::default();
    let mut settings = list_settings(&["winusdt", "FLATUSDT", "WINUSDT"]);
    settings.scan.cycles = 2;
    let screener = screener(mixed_source(), settings, &sink);

    let completed = screener.run_pull(&CancellationToken::new()).await.unwrap();
    assert_eq!(completed, 2);

    let reports = sink.reports();
    assert_eq!(reports.len(), 2);
    for report in &reports {
        // The list is normalised before the first cycle
        assert_eq!(report.symbols, 2);
        assert_eq!(report.results.len(), 1);
    }
    assert_ne!(reports[0].cycle_id, reports[1].cycle_id);
}

#[tokio::test]
async fn test_run_pull_reports_rolling_state() {
    let sink = RecordingSink::default();
    let mut settings = list_settings(&["WINUSDT", "FLATUSDT", "SHORTUSDT"]);
    settings.scan.cycles = 2;
    let screener = screener(mixed_source(), settings, &sink);

    screener.run_pull(&CancellationToken::new()).await.unwrap();
    let reports = sink.reports();
    assert_eq!(reports.len(), 2);

    for report in &reports {
        // SHORTUSDT has 10 closes, under the 22 needed
        let read: Vec<&str> = report.state.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(read, vec!["FLATUSDT", "WINUSDT"]);
        assert!((report.state[0].volume_spike - 1.0).abs() < 1e-9);
        assert!((report.state[1].volume_spike - 4.0).abs() < 1e-9);
        assert_eq!(report.state[1].latest_close, 103.0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_run_pull_cycle_starts_are_one_interval_apart() {
    let sink = RecordingSink::default();
    let mut settings = list_settings(&["WINUSDT"]);
    settings.scan.cycles = 3;
    settings.scan.interval_secs = 10;
    let screener = screener(mixed_source(), settings, &sink);

    screener.run_pull(&CancellationToken::new()).await.unwrap();

    // Every cycle spends time fetching; the gap between starts stays fixed
    let reports = sink.reports();
    assert!(reports.iter().all(|r| r.duration >= Duration::from_millis(20)));

    let published = sink.published_at();
    assert_eq!(published.len(), 3);
    for pair in published.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::from_secs(10));
    }
}

#[tokio::test]
async fn test_run_pull_rejects_empty_universe() {
    let source = Arc::new(MockSource::new(&[]));
    let sink = RecordingSink::default();
    let mut settings = list_settings(&[]);
    settings.universe.mode = UniverseMode::All;
    let screener = screener(source, settings, &sink);

    assert!(screener.run_pull(&CancellationToken::new()).await.is_err());
    assert!(sink.reports().is_empty());
}

#[tokio::test]
async fn test_top_mode_keeps_cross_listed_symbols() {
    let mut source = MockSource::new(&[
        ("AUSDT", Profile::Flat),
        ("BUSDT", Profile::Flat),
        ("CUSDT", Profile::Flat),
    ]);
    source.by_volume = symbols(&["CUSDT", "XUSDT", "AUSDT", "BUSDT"]);

    let sink = RecordingSink::default();
    let mut settings = list_settings(&[]);
    settings.universe.mode = UniverseMode::Top;
    settings.universe.top_n = 2;
    let screener = screener(Arc::new(source), settings, &sink);

    let universe = screener.resolve_universe().await.unwrap();
    assert_eq!(universe, symbols(&["CUSDT", "AUSDT"]));
}
