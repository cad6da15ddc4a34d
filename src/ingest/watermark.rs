//! Watermark reader

use crate::telemetry::{self, CounterMetric};
use crate::warehouse::Warehouse;
use chrono::{DateTime, Utc};

/// Reads the newest stored candle time.
///
/// Failures are logged and reported as "no watermark"; the run carries on
/// with an unbounded fetch.
pub struct WatermarkReader<'a> {
    warehouse: &'a dyn Warehouse,
}

impl<'a> WatermarkReader<'a> {
    pub fn new(warehouse: &'a dyn Warehouse) -> Self {
        Self { warehouse }
    }

    pub async fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        match self.warehouse.latest_timestamp().await {
            Ok(Some(ts)) => {
                tracing::debug!(table = %self.warehouse.target(), watermark = %ts, "Read watermark");
                Some(ts)
            }
            Ok(None) => {
                tracing::info!(table = %self.warehouse.target(), "Table is empty, no watermark");
                None
            }
            Err(e) => {
                tracing::warn!(
                    table = %self.warehouse.target(),
                    error = %e,
                    "Watermark query failed, continuing without it"
                );
                telemetry::increment(CounterMetric::WatermarkFailures, 1);
                None
            }
        }
    }
}
