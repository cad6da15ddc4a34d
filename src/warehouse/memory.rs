//! In-memory warehouse for dry runs and tests

use super::{
    latest_prices, partition_duplicates, RowError, Warehouse, WarehouseError, INVALID_REASON,
};
use crate::normalize::{NormalizedRow, PricePoint, RowKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Append-only table held in memory, with the same duplicate semantics as the
/// Parquet backend and switches for simulating failures
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    rows: Mutex<Vec<NormalizedRow>>,
    rejected_market: Mutex<Option<String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    insert_calls: AtomicUsize,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with rows already stored
    pub fn with_rows(rows: Vec<NormalizedRow>) -> Self {
        let warehouse = Self::default();
        *warehouse.lock_rows() = rows;
        warehouse
    }

    /// Make read queries fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make whole-batch writes fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Refuse rows of `market` as invalid (a non-duplicate row error)
    pub fn reject_market(&self, market: impl Into<String>) {
        *self
            .rejected_market
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(market.into());
    }

    /// Snapshot of stored rows in insertion order
    pub fn rows(&self) -> Vec<NormalizedRow> {
        self.lock_rows().clone()
    }

    /// Number of `insert_rows` calls that reached the table
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    fn lock_rows(&self) -> MutexGuard<'_, Vec<NormalizedRow>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_reads(&self) -> Result<(), WarehouseError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(WarehouseError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    fn target(&self) -> String {
        "memory".to_string()
    }

    async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, WarehouseError> {
        self.check_reads()?;
        Ok(self.lock_rows().iter().map(|r| r.timestamp).max())
    }

    async fn insert_rows(&self, rows: &[NormalizedRow]) -> Result<Vec<RowError>, WarehouseError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(WarehouseError::Unavailable("writes disabled".to_string()));
        }
        self.insert_calls.fetch_add(1, Ordering::SeqCst);

        let rejected_market = self
            .rejected_market
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let mut table = self.lock_rows();
        let existing: HashSet<RowKey> = table.iter().map(NormalizedRow::key).collect();
        let (accepted, mut errors) = partition_duplicates(&existing, rows);

        for row in accepted {
            if row.market.is_some() && row.market == rejected_market {
                // Indexes must point into the submitted batch
                let index = rows
                    .iter()
                    .position(|r| std::ptr::eq(r, row))
                    .unwrap_or_default();
                errors.push(RowError {
                    index,
                    key: Some(row.key()),
                    reason: INVALID_REASON.to_string(),
                    message: format!(
                        "market {} is not accepted",
                        row.market.as_deref().unwrap_or_default()
                    ),
                });
            } else {
                table.push(row.clone());
            }
        }

        errors.sort_by_key(|e| e.index);
        Ok(errors)
    }

    async fn recent_prices(&self, limit: usize) -> Result<Vec<PricePoint>, WarehouseError> {
        self.check_reads()?;
        Ok(latest_prices(&self.lock_rows(), limit))
    }
}
