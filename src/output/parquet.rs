//! Parquet result sink, one file per cycle

use super::ResultSink;
use crate::scoring::Signal;
use crate::screener::CycleReport;
use arrow::array::{ArrayRef, Float64Array, StringArray, TimestampMicrosecondArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Float columns, in schema order
const FLOAT_COLUMNS: [&str; 17] = [
    "score",
    "entry",
    "stop",
    "tp1",
    "tp2",
    "tp3",
    "volume_spike",
    "volume_persistence",
    "spot_cvd",
    "perp_cvd",
    "open_interest_delta",
    "funding_drift",
    "perp_spot_volume_ratio",
    "atr",
    "band_position",
    "latest_close",
    "volatility",
];

fn float_values(s: &Signal) -> [f64; 17] {
    let f = &s.features;
    [
        s.score,
        s.levels.entry,
        s.levels.stop,
        s.levels.tp1,
        s.levels.tp2,
        s.levels.tp3,
        f.volume_spike,
        f.volume_persistence,
        f.spot_cvd,
        f.perp_cvd,
        f.open_interest_delta,
        f.funding_drift,
        f.perp_spot_volume_ratio,
        f.atr,
        f.band_position,
        f.latest_close,
        f.volatility,
    ]
}

/// One row per ranked signal
pub fn signal_schema() -> Schema {
    let mut fields = vec![
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
        Field::new("cycle_id", DataType::Utf8, false),
        Field::new("rank", DataType::UInt32, false),
        Field::new("symbol", DataType::Utf8, false),
        Field::new("path", DataType::Utf8, false),
        Field::new("reasons", DataType::Utf8, false),
        Field::new("vwap_relation", DataType::Utf8, false),
    ];
    fields.extend(
        FLOAT_COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Float64, false)),
    );
    Schema::new(fields)
}

/// Write ranked signals to `path`
pub fn write_signals(path: &Path, cycle_id: Uuid, signals: &[Signal]) -> anyhow::Result<()> {
    let schema = Arc::new(signal_schema());
    let file = File::create(path)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

    let timestamps: Vec<i64> = signals
        .iter()
        .map(|s| s.timestamp.timestamp_micros())
        .collect();
    let cycle = cycle_id.to_string();
    let reasons: Vec<String> = signals.iter().map(Signal::reason_string).collect();
    let vwap: Vec<String> = signals
        .iter()
        .map(|s| s.features.vwap_relation.to_string())
        .collect();

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampMicrosecondArray::from(timestamps).with_timezone("UTC")),
        Arc::new(StringArray::from(vec![cycle.as_str(); signals.len()])),
        Arc::new(UInt32Array::from_iter_values(
            (1..=signals.len()).map(|r| r as u32),
        )),
        Arc::new(StringArray::from_iter_values(
            signals.iter().map(|s| s.symbol.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            signals.iter().map(|s| s.path.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(reasons.iter())),
        Arc::new(StringArray::from_iter_values(vwap.iter())),
    ];

    let rows: Vec<[f64; 17]> = signals.iter().map(float_values).collect();
    for i in 0..FLOAT_COLUMNS.len() {
        columns.push(Arc::new(Float64Array::from_iter_values(
            rows.iter().map(|row| row[i]),
        )));
    }

    let batch = RecordBatch::try_new(schema, columns)?;
    writer.write(&batch)?;
    writer.close()?;

    tracing::debug!(path = ?path, count = signals.len(), "Wrote signals to Parquet");
    Ok(())
}

/// Appends each cycle's ranked results as a Parquet file
pub struct ParquetSink {
    output_dir: PathBuf,
}

impl ParquetSink {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    /// Ensure output directory exists
    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    /// File path for one cycle
    pub fn file_path(&self, started_at: DateTime<Utc>, cycle_id: Uuid) -> PathBuf {
        let id = cycle_id.simple().to_string();
        let filename = format!(
            "ignition_{}_{}.parquet",
            started_at.format("%Y%m%d_%H%M%S"),
            &id[..8]
        );
        self.output_dir.join(filename)
    }
}

#[async_trait]
impl ResultSink for ParquetSink {
    fn name(&self) -> &'static str {
        "parquet"
    }

    async fn publish(&self, report: &CycleReport) -> anyhow::Result<()> {
        if report.results.is_empty() {
            return Ok(());
        }

        self.ensure_dir()?;
        let path = self.file_path(report.started_at, report.cycle_id);
        let cycle_id = report.cycle_id;
        let signals = report.results.clone();

        tokio::task::spawn_blocking(move || write_signals(&path, cycle_id, &signals)).await??;
        Ok(())
    }
}
