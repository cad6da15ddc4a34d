//! Upbit candle wire types and fetch errors

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One hourly candle as returned by the Upbit candles endpoint.
///
/// Every field is optional so a single malformed record cannot fail decoding
/// of the whole response; the normalizer decides what is usable. Prices and
/// volume are kept as raw JSON values because Upbit sends numbers, while
/// replays and proxies sometimes send them as strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandle {
    /// Market code (e.g., "KRW-BTC")
    #[serde(default)]
    pub market: Option<String>,
    /// Candle open time in UTC without offset (e.g., "2024-01-01T00:00:00")
    #[serde(default)]
    pub candle_date_time_utc: Option<String>,
    #[serde(default)]
    pub opening_price: Option<Value>,
    #[serde(default)]
    pub high_price: Option<Value>,
    #[serde(default)]
    pub low_price: Option<Value>,
    /// Last trade price of the interval, i.e. the close
    #[serde(default)]
    pub trade_price: Option<Value>,
    #[serde(default)]
    pub candle_acc_trade_volume: Option<Value>,
}

/// Candle fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Upbit answered with a non-success status
    #[error("Upbit API error: {status} - {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    /// Response body was not a JSON array of candles
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}
