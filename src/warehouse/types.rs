//! Warehouse types

use crate::normalize::RowKey;
use std::fmt;
use thiserror::Error;

/// Default GCP project when `GCP_PROJECT_ID` is not set
pub const DEFAULT_PROJECT_ID: &str = "candle-ingest-dev";
/// Default dataset holding the candle table
pub const DEFAULT_DATASET: &str = "price_data";
/// Default candle table
pub const DEFAULT_TABLE: &str = "upbit_hourly_candles";

/// Fully qualified warehouse table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Backtick-quoted identifier for standard SQL
    pub fn sql_ident(&self) -> String {
        format!("`{}.{}.{}`", self.project, self.dataset, self.table)
    }
}

impl Default for TableRef {
    fn default() -> Self {
        Self::new(DEFAULT_PROJECT_ID, DEFAULT_DATASET, DEFAULT_TABLE)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.project, self.dataset, self.table)
    }
}

/// How a row-level rejection should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRejection {
    /// Key already stored; expected when fetch windows overlap
    Duplicate,
    /// Anything else
    Other,
}

/// Reason attached to duplicate rejections by the local backends
pub const DUPLICATE_REASON: &str = "duplicate";

/// Reason attached to rows the local backends cannot store
pub const INVALID_REASON: &str = "invalid";

/// A row the warehouse refused
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    /// Position in the submitted batch
    pub index: usize,
    /// Key of the refused row, when it could be resolved
    pub key: Option<RowKey>,
    /// Machine-readable reason (e.g., "invalid", "duplicate")
    pub reason: String,
    pub message: String,
}

impl RowError {
    pub fn duplicate(index: usize, key: RowKey) -> Self {
        let message = format!("duplicate row for key {}", key);
        Self {
            index,
            key: Some(key),
            reason: DUPLICATE_REASON.to_string(),
            message,
        }
    }

    /// A row without a market, which no table accepts
    pub fn missing_market(index: usize, key: RowKey) -> Self {
        Self {
            index,
            key: Some(key),
            reason: INVALID_REASON.to_string(),
            message: "row has no market".to_string(),
        }
    }

    /// Classify the rejection.
    ///
    /// Warehouses report duplicates inconsistently, so the message is checked
    /// as well as the reason.
    pub fn classify(&self) -> RowRejection {
        if self.reason.eq_ignore_ascii_case(DUPLICATE_REASON)
            || self.message.to_lowercase().contains("duplicate")
        {
            RowRejection::Duplicate
        } else {
            RowRejection::Other
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(
                f,
                "row {} ({}): {}: {}",
                self.index, key, self.reason, self.message
            ),
            None => write!(f, "row {}: {}: {}", self.index, self.reason, self.message),
        }
    }
}

/// Batch-level warehouse errors
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("warehouse API error: {status} - {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid warehouse response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("query failed: {0}")]
    Query(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("warehouse unavailable: {0}")]
    Unavailable(String),
}
