//! Stored row types

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A candle in the fixed shape of the warehouse table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    /// Candle open time, microsecond precision
    pub timestamp: DateTime<Utc>,
    /// Market code (e.g., "KRW-BTC"); `None` when the candle had none, which
    /// warehouses refuse at insert time
    pub market: Option<String>,
    pub opening_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    /// Sourced from Upbit's `trade_price`
    pub closing_price: Option<f64>,
    /// Accumulated trade volume, never negative
    pub trade_volume: Option<f64>,
}

impl NormalizedRow {
    /// Natural key of the row
    pub fn key(&self) -> RowKey {
        RowKey {
            timestamp: self.timestamp,
            market: self.market.clone(),
        }
    }
}

/// (`timestamp`, `market`) natural key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub timestamp: DateTime<Utc>,
    pub market: Option<String>,
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}",
            self.market.as_deref().unwrap_or("-"),
            format_timestamp(self.timestamp)
        )
    }
}

/// One point of the dashboard price series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub market: String,
    /// Stored closing price
    pub price: Option<f64>,
    /// Always UTC; display conversion is up to the reader
    pub timestamp: DateTime<Utc>,
}

impl From<&NormalizedRow> for PricePoint {
    fn from(row: &NormalizedRow) -> Self {
        Self {
            market: row.market.clone().unwrap_or_default(),
            price: row.closing_price,
            timestamp: row.timestamp,
        }
    }
}

/// RFC3339 with microseconds and a `Z` suffix, the form rows are stored with
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
