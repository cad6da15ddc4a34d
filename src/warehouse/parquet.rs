//! Parquet-directory warehouse
//!
//! Each append writes one SNAPPY-compressed file; reads scan every file in
//! the directory. Meant for offline runs, not for large tables.

use super::{latest_prices, partition_duplicates, RowError, Warehouse, WarehouseError};
use crate::normalize::{NormalizedRow, PricePoint, RowKey};
use arrow::array::{Array, ArrayRef, Float64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const FILE_PREFIX: &str = "candles";

/// Candle table schema
pub fn candle_schema() -> Schema {
    Schema::new(vec![
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
        Field::new("market", DataType::Utf8, false),
        Field::new("opening_price", DataType::Float64, true),
        Field::new("high_price", DataType::Float64, true),
        Field::new("low_price", DataType::Float64, true),
        Field::new("closing_price", DataType::Float64, true),
        Field::new("trade_volume", DataType::Float64, true),
    ])
}

/// Warehouse backed by a directory of Parquet files
pub struct ParquetWarehouse {
    output_dir: PathBuf,
}

impl ParquetWarehouse {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Stored files in name order; a missing directory is an empty table
    fn data_files(&self) -> Result<Vec<PathBuf>, WarehouseError> {
        if !self.output_dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.output_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "parquet") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn next_file_path(&self, now: DateTime<Utc>) -> PathBuf {
        let filename = format!(
            "{}_{}_{}.parquet",
            FILE_PREFIX,
            now.format("%Y%m%d_%H%M%S"),
            uuid::Uuid::new_v4().simple()
        );
        self.output_dir.join(filename)
    }

    /// Read every stored row
    pub fn read_all(&self) -> Result<Vec<NormalizedRow>, WarehouseError> {
        let mut rows = Vec::new();
        for path in self.data_files()? {
            rows.extend(read_file(&path)?);
        }
        Ok(rows)
    }

    fn write_file(&self, path: &Path, rows: &[&NormalizedRow]) -> Result<(), WarehouseError> {
        fs::create_dir_all(&self.output_dir)?;

        let schema = Arc::new(candle_schema());
        let file = File::create(path)?;

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

        let timestamps: Vec<i64> = rows.iter().map(|r| r.timestamp.timestamp_micros()).collect();
        let markets: Vec<Option<&str>> = rows.iter().map(|r| r.market.as_deref()).collect();
        let float_column = |f: fn(&NormalizedRow) -> Option<f64>| -> ArrayRef {
            Arc::new(Float64Array::from(
                rows.iter().map(|r| f(r)).collect::<Vec<_>>(),
            ))
        };

        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(TimestampMicrosecondArray::from(timestamps).with_timezone("UTC"))
                    as ArrayRef,
                Arc::new(StringArray::from(markets)) as ArrayRef,
                float_column(|r| r.opening_price),
                float_column(|r| r.high_price),
                float_column(|r| r.low_price),
                float_column(|r| r.closing_price),
                float_column(|r| r.trade_volume),
            ],
        )?;

        writer.write(&batch)?;
        writer.close()?;

        tracing::debug!(path = ?path, count = rows.len(), "Wrote candles to Parquet");

        Ok(())
    }
}

fn read_file(path: &Path) -> Result<Vec<NormalizedRow>, WarehouseError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;

        let timestamps = column::<TimestampMicrosecondArray>(&batch, "timestamp")?;
        let markets = column::<StringArray>(&batch, "market")?;
        let opening = column::<Float64Array>(&batch, "opening_price")?;
        let high = column::<Float64Array>(&batch, "high_price")?;
        let low = column::<Float64Array>(&batch, "low_price")?;
        let closing = column::<Float64Array>(&batch, "closing_price")?;
        let volume = column::<Float64Array>(&batch, "trade_volume")?;

        for i in 0..batch.num_rows() {
            let timestamp = DateTime::from_timestamp_micros(timestamps.value(i)).ok_or_else(
                || WarehouseError::Query(format!("timestamp out of range in {:?}", path)),
            )?;

            rows.push(NormalizedRow {
                timestamp,
                market: (!markets.is_null(i)).then(|| markets.value(i).to_string()),
                opening_price: optional(opening, i),
                high_price: optional(high, i),
                low_price: optional(low, i),
                closing_price: optional(closing, i),
                trade_volume: optional(volume, i),
            });
        }
    }

    Ok(rows)
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a T, WarehouseError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| WarehouseError::Query(format!("invalid {} column", name)))
}

fn optional(array: &Float64Array, i: usize) -> Option<f64> {
    (!array.is_null(i)).then(|| array.value(i))
}

#[async_trait]
impl Warehouse for ParquetWarehouse {
    fn target(&self) -> String {
        self.output_dir.display().to_string()
    }

    async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, WarehouseError> {
        Ok(self.read_all()?.into_iter().map(|r| r.timestamp).max())
    }

    async fn insert_rows(&self, rows: &[NormalizedRow]) -> Result<Vec<RowError>, WarehouseError> {
        let existing: HashSet<RowKey> = self.read_all()?.iter().map(NormalizedRow::key).collect();
        let (accepted, rejected) = partition_duplicates(&existing, rows);

        if !accepted.is_empty() {
            let path = self.next_file_path(Utc::now());
            self.write_file(&path, &accepted)?;
        }

        Ok(rejected)
    }

    async fn recent_prices(&self, limit: usize) -> Result<Vec<PricePoint>, WarehouseError> {
        Ok(latest_prices(&self.read_all()?, limit))
    }
}
