//! Upbit REST client for hourly candles
//!
//! Wraps `GET /v1/candles/minutes/60`. Upbit returns the newest candle first
//! and caps a single request at 200 candles; larger counts are rejected by the
//! API itself, so nothing is clamped here.

use super::{CandleSource, FetchError, RawCandle};
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::time::{Duration, Instant};

/// Upbit REST base URL
pub const UPBIT_API_URL: &str = "https://api.upbit.com";

/// Path of the 60-minute candle endpoint
pub const HOURLY_CANDLES_PATH: &str = "/v1/candles/minutes/60";

/// Largest batch Upbit serves per request
pub const MAX_CANDLES_PER_REQUEST: u32 = 200;

/// Configuration for the Upbit client
#[derive(Debug, Clone)]
pub struct UpbitConfig {
    /// Base URL for the REST API
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for UpbitConfig {
    fn default() -> Self {
        Self {
            base_url: UPBIT_API_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Client for Upbit's hourly candle endpoint
pub struct UpbitClient {
    config: UpbitConfig,
    client: Client,
}

impl UpbitClient {
    /// Create a client with default configuration
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(UpbitConfig::default())
    }

    /// Create a client with custom configuration
    pub fn with_config(config: UpbitConfig) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn candles_url(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            HOURLY_CANDLES_PATH
        )
    }

    /// Build the query string pairs for a candle request
    fn query_params(
        market: &str,
        count: u32,
        to: Option<DateTime<Utc>>,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![("market", market.to_string()), ("count", count.to_string())];
        if let Some(to) = to {
            params.push(("to", format_upper_bound(to)));
        }
        params
    }
}

#[async_trait]
impl CandleSource for UpbitClient {
    async fn fetch(
        &self,
        market: &str,
        count: u32,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawCandle>, FetchError> {
        let url = self.candles_url();
        let params = Self::query_params(market, count, to);

        tracing::debug!(url = %url, ?params, "Fetching hourly candles");

        let started = Instant::now();
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .query(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let body = response.bytes().await?;
        let candles: Vec<RawCandle> = serde_json::from_slice(&body)?;

        telemetry::record_fetch_latency(started.elapsed());
        tracing::debug!(market, received = candles.len(), "Fetched hourly candles");

        Ok(candles)
    }
}

/// Format the `to` parameter the way Upbit documents it (ISO-8601, UTC)
pub fn format_upper_bound(to: DateTime<Utc>) -> String {
    to.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
