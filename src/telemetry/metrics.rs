//! Ingestion metrics
//!
//! Emitted through the `metrics` facade. Nothing is exported unless the
//! embedding process installs a recorder.

use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterMetric {
    /// Rows stored by the warehouse
    RowsAccepted,
    /// Rows refused as already stored
    RowsDuplicate,
    /// Rows refused for any other reason
    RowsFailed,
    /// Watermark queries that failed
    WatermarkFailures,
}

impl CounterMetric {
    pub fn name(self) -> &'static str {
        match self {
            CounterMetric::RowsAccepted => "candle_ingest_rows_accepted_total",
            CounterMetric::RowsDuplicate => "candle_ingest_rows_duplicate_total",
            CounterMetric::RowsFailed => "candle_ingest_rows_failed_total",
            CounterMetric::WatermarkFailures => "candle_ingest_watermark_failures_total",
        }
    }
}

/// Final state of a run, used as the `outcome` label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    NetworkError,
    StorageError,
}

impl RunOutcome {
    pub fn label(self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::NetworkError => "network_error",
            RunOutcome::StorageError => "storage_error",
        }
    }
}

/// Add `value` to a counter
pub fn increment(metric: CounterMetric, value: u64) {
    metrics::counter!(metric.name()).increment(value);
}

/// Record a finished run
pub fn record_run(outcome: RunOutcome) {
    metrics::counter!("candle_ingest_runs_total", "outcome" => outcome.label()).increment(1);
}

/// Record the latency of one candle request
pub fn record_fetch_latency(duration: Duration) {
    metrics::histogram!("candle_ingest_fetch_latency_ms").record(duration.as_secs_f64() * 1000.0);
}
