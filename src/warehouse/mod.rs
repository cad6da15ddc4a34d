//! Warehouse module
//!
//! Append-only storage for normalized candles plus the read queries the
//! watermark reader and dashboard use. BigQuery is the production backend;
//! Parquet and in-memory backends serve offline runs and tests.

mod bigquery;
mod memory;
mod parquet;
mod types;

pub use bigquery::{BigQueryConfig, BigQueryWarehouse, BIGQUERY_API_URL};
pub use memory::MemoryWarehouse;
pub use self::parquet::{candle_schema, ParquetWarehouse};
pub use types::{
    RowError, RowRejection, TableRef, WarehouseError, DEFAULT_DATASET, DEFAULT_PROJECT_ID,
    DEFAULT_TABLE, DUPLICATE_REASON, INVALID_REASON,
};

use crate::config::{WarehouseBackend, WarehouseConfig};
use crate::normalize::{NormalizedRow, PricePoint, RowKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Trait for warehouse backends
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Human-readable name of the target table, for logs
    fn target(&self) -> String;

    /// Maximum stored `timestamp`, `None` for an empty table
    async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, WarehouseError>;

    /// Append rows. Never updates or deletes.
    ///
    /// `Ok` carries the rows the warehouse refused; every other row was
    /// stored. `Err` means the batch as a whole failed.
    async fn insert_rows(&self, rows: &[NormalizedRow]) -> Result<Vec<RowError>, WarehouseError>;

    /// Most recent `limit` price points, newest first
    async fn recent_prices(&self, limit: usize) -> Result<Vec<PricePoint>, WarehouseError>;
}

#[async_trait]
impl<W: Warehouse + ?Sized> Warehouse for Arc<W> {
    fn target(&self) -> String {
        (**self).target()
    }

    async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, WarehouseError> {
        (**self).latest_timestamp().await
    }

    async fn insert_rows(&self, rows: &[NormalizedRow]) -> Result<Vec<RowError>, WarehouseError> {
        (**self).insert_rows(rows).await
    }

    async fn recent_prices(&self, limit: usize) -> Result<Vec<PricePoint>, WarehouseError> {
        (**self).recent_prices(limit).await
    }
}

/// Build the configured backend
pub fn from_config(config: &WarehouseConfig) -> Result<Box<dyn Warehouse>, WarehouseError> {
    let warehouse: Box<dyn Warehouse> = match config.backend {
        WarehouseBackend::BigQuery => Box::new(BigQueryWarehouse::new(BigQueryConfig {
            api_base_url: config.api_base_url.clone(),
            table: config.table_ref(),
            access_token: config.access_token.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })?),
        WarehouseBackend::Parquet => Box::new(ParquetWarehouse::new(config.output_dir.clone())),
        WarehouseBackend::Memory => Box::new(MemoryWarehouse::new()),
    };

    tracing::debug!(backend = ?config.backend, target = %warehouse.target(), "Warehouse ready");
    Ok(warehouse)
}

/// Split a batch into rows to store and rejections. Rows without a market are
/// refused; the rest are checked against both the stored keys and earlier
/// rows of the same batch.
pub(crate) fn partition_duplicates<'a>(
    existing: &HashSet<RowKey>,
    rows: &'a [NormalizedRow],
) -> (Vec<&'a NormalizedRow>, Vec<RowError>) {
    let mut seen = HashSet::new();
    let mut accepted = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        let key = row.key();
        if row.market.is_none() {
            rejected.push(RowError::missing_market(index, key));
        } else if existing.contains(&key) || seen.contains(&key) {
            rejected.push(RowError::duplicate(index, key));
        } else {
            seen.insert(key);
            accepted.push(row);
        }
    }

    (accepted, rejected)
}

/// Newest-first price points from an unordered set of rows
pub(crate) fn latest_prices(rows: &[NormalizedRow], limit: usize) -> Vec<PricePoint> {
    let mut points: Vec<PricePoint> = rows.iter().map(PricePoint::from).collect();
    points.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    points.truncate(limit);
    points
}
