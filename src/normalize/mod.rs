//! Candle normalization
//!
//! Turns raw Upbit candles into [`NormalizedRow`]s. Pure: no I/O, and the same
//! input always yields the same output in the same order.

mod types;

pub use types::{format_timestamp, NormalizedRow, PricePoint, RowKey};

use crate::feed::RawCandle;
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde_json::Value;
use thiserror::Error;

/// Accepted offset-less layouts; Upbit sends the first one
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Why a raw candle could not become a row
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowCoercionError {
    #[error("missing candle_date_time_utc")]
    MissingTimestamp,
    #[error("unparseable timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Normalize a batch, dropping only candles without a usable timestamp
pub fn normalize(raw: &[RawCandle]) -> Vec<NormalizedRow> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, candle)| match normalize_candle(candle) {
            Ok(row) => Some(row),
            Err(e) => {
                tracing::debug!(index, error = %e, "Dropping candle");
                None
            }
        })
        .collect()
}

/// Normalize a single candle.
///
/// Only the timestamp is required. A missing or blank market, and prices or
/// volume that cannot be read as finite numbers, become `None` rather than
/// failing the row.
pub fn normalize_candle(raw: &RawCandle) -> Result<NormalizedRow, RowCoercionError> {
    let timestamp = raw
        .candle_date_time_utc
        .as_deref()
        .ok_or(RowCoercionError::MissingTimestamp)
        .and_then(parse_timestamp)?;

    let market = raw
        .market
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    Ok(NormalizedRow {
        timestamp,
        market,
        opening_price: coerce_f64(raw.opening_price.as_ref()),
        high_price: coerce_f64(raw.high_price.as_ref()),
        low_price: coerce_f64(raw.low_price.as_ref()),
        closing_price: coerce_f64(raw.trade_price.as_ref()),
        trade_volume: coerce_f64(raw.candle_acc_trade_volume.as_ref()).filter(|v| *v >= 0.0),
    })
}

/// Parse a candle time as UTC, truncated to microseconds.
///
/// Offset-less input is taken as UTC; RFC3339 input is converted.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, RowCoercionError> {
    let s = s.trim();

    let parsed = DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        })
        .ok_or_else(|| RowCoercionError::InvalidTimestamp(s.to_string()))?;

    Ok(truncate_to_micros(parsed))
}

fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = ts.nanosecond();
    ts.with_nanosecond(nanos - nanos % 1_000).unwrap_or(ts)
}

/// Read a JSON number or numeric string as a finite `f64`
pub fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
