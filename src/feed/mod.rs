//! Candle feed module
//!
//! Fetches hourly candles from the Upbit REST API

mod types;
mod upbit;

pub use types::{FetchError, RawCandle};
pub use upbit::{
    format_upper_bound, UpbitClient, UpbitConfig, HOURLY_CANDLES_PATH, MAX_CANDLES_PER_REQUEST,
    UPBIT_API_URL,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Default market fetched when none is configured
pub const DEFAULT_MARKET: &str = "KRW-BTC";

/// Trait for candle source implementations
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetch up to `count` of the most recent hourly candles for `market`,
    /// newest first. With `to`, only candles at or before that instant.
    async fn fetch(
        &self,
        market: &str,
        count: u32,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawCandle>, FetchError>;
}
