//! Ingestion pipeline
//!
//! Watermark read, candle fetch, normalization and append, run once per
//! trigger. Everything a run needs travels in an [`IngestContext`] built by
//! the caller.

mod appender;
mod orchestrator;
mod watermark;

pub use appender::{AppendSummary, Appender};
pub use orchestrator::{IngestState, Orchestrator, RunReport};
pub use watermark::WatermarkReader;

use crate::config::Config;
use crate::feed::{CandleSource, FetchError, UpbitClient, UpbitConfig, DEFAULT_MARKET};
use crate::warehouse::{self, Warehouse, WarehouseError};
use std::time::Duration;
use thiserror::Error;

/// Candles requested per run; Upbit's per-request maximum
pub const DEFAULT_CANDLE_COUNT: u32 = 200;

/// Message returned to the trigger on success
pub const SUCCESS_MESSAGE: &str = "Upbit hourly candle ingestion completed successfully.";

/// Append failures that abort a run
#[derive(Debug, Error)]
pub enum StorageWriteError {
    /// The write as a whole failed
    #[error("append of {rows} rows to {target} failed: {source}")]
    Batch {
        target: String,
        rows: usize,
        #[source]
        source: WarehouseError,
    },
    /// Some rows were refused for reasons other than duplication
    #[error("{failed} of {attempted} rows rejected, first: {first}")]
    Rows {
        attempted: usize,
        failed: usize,
        first: String,
    },
}

/// Fatal run errors
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("candle fetch failed: {0}")]
    Network(#[from] FetchError),
    #[error("storage write failed: {0}")]
    Storage(#[from] StorageWriteError),
}

/// Clients and parameters for one run
pub struct IngestContext {
    pub source: Box<dyn CandleSource>,
    pub warehouse: Box<dyn Warehouse>,
    pub market: String,
    pub count: u32,
}

impl IngestContext {
    /// Context for the default market and batch size
    pub fn new(source: Box<dyn CandleSource>, warehouse: Box<dyn Warehouse>) -> Self {
        Self {
            source,
            warehouse,
            market: DEFAULT_MARKET.to_string(),
            count: DEFAULT_CANDLE_COUNT,
        }
    }

    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = market.into();
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Build the Upbit client and configured warehouse
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let source = UpbitClient::with_config(UpbitConfig {
            base_url: config.feed.base_url.clone(),
            timeout: Duration::from_secs(config.feed.timeout_secs),
        })?;
        let warehouse = warehouse::from_config(&config.warehouse)?;

        Ok(Self::new(Box::new(source), warehouse)
            .with_market(config.feed.market.clone())
            .with_count(config.feed.count))
    }
}

/// Entry point for a scheduled or manual trigger.
///
/// The payload is ignored. Returns a message and an HTTP-style status: 200 on
/// success, 500 on any fatal error.
pub async fn handle_trigger<P>(ctx: &IngestContext, _payload: P) -> (String, u16) {
    tracing::info!(market = %ctx.market, count = ctx.count, "Starting Upbit hourly candle ingestion");

    match Orchestrator::new(ctx).run().await {
        Ok(report) => {
            tracing::info!(
                run_id = %report.run_id,
                fetched = report.fetched,
                normalized = report.normalized,
                accepted = report.append.accepted,
                duplicates = report.append.duplicates,
                report = %serde_json::to_string(&report).unwrap_or_default(),
                "Upbit hourly candle ingestion completed"
            );
            (SUCCESS_MESSAGE.to_string(), 200)
        }
        Err(IngestError::Network(e)) => {
            tracing::error!(error = %e, "Network or API request error");
            (format!("Network or API request error: {}", e), 500)
        }
        Err(e) => {
            tracing::error!(error = %e, "Ingestion failed");
            (
                format!("An unexpected error occurred during ingestion: {}", e),
                500,
            )
        }
    }
}
