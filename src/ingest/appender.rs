//! Append-only writer with row-level rejection handling

use super::StorageWriteError;
use crate::normalize::NormalizedRow;
use crate::telemetry::{self, CounterMetric};
use crate::warehouse::{RowError, RowRejection, Warehouse};
use serde::Serialize;

/// Outcome counts of one append
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppendSummary {
    pub attempted: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub failed: usize,
    /// Details of the non-duplicate rejections
    #[serde(skip)]
    pub failures: Vec<RowError>,
}

impl AppendSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Writes normalized rows to a warehouse
pub struct Appender<'a> {
    warehouse: &'a dyn Warehouse,
}

impl<'a> Appender<'a> {
    pub fn new(warehouse: &'a dyn Warehouse) -> Self {
        Self { warehouse }
    }

    /// Append `rows`, classifying each rejection.
    ///
    /// Rows the warehouse accepted stay written even when others fail; only a
    /// batch-level failure is returned as `Err`.
    pub async fn append(&self, rows: &[NormalizedRow]) -> Result<AppendSummary, StorageWriteError> {
        if rows.is_empty() {
            tracing::info!("No rows to append");
            return Ok(AppendSummary::default());
        }

        let target = self.warehouse.target();
        let row_errors = self
            .warehouse
            .insert_rows(rows)
            .await
            .map_err(|source| StorageWriteError::Batch {
                target: target.clone(),
                rows: rows.len(),
                source,
            })?;

        let mut summary = AppendSummary {
            attempted: rows.len(),
            ..Default::default()
        };

        for error in row_errors {
            match error.classify() {
                RowRejection::Duplicate => {
                    tracing::info!(
                        index = error.index,
                        key = ?error.key.as_ref().map(ToString::to_string),
                        "Duplicate row skipped"
                    );
                    summary.duplicates += 1;
                }
                RowRejection::Other => {
                    tracing::error!(
                        index = error.index,
                        key = ?error.key.as_ref().map(ToString::to_string),
                        reason = %error.reason,
                        message = %error.message,
                        "Row rejected by warehouse"
                    );
                    summary.failed += 1;
                    summary.failures.push(error);
                }
            }
        }

        summary.accepted = summary
            .attempted
            .saturating_sub(summary.duplicates + summary.failed);

        telemetry::increment(CounterMetric::RowsAccepted, summary.accepted as u64);
        telemetry::increment(CounterMetric::RowsDuplicate, summary.duplicates as u64);
        telemetry::increment(CounterMetric::RowsFailed, summary.failed as u64);

        tracing::info!(
            table = %target,
            attempted = summary.attempted,
            accepted = summary.accepted,
            duplicates = summary.duplicates,
            failed = summary.failed,
            "Appended rows"
        );

        Ok(summary)
    }
}
