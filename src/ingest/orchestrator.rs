//! Ingestion run state machine
//!
//! One run walks `Idle -> FetchingWatermark -> FetchingCandles -> Normalizing
//! -> Appending -> Done`, or ends in `Failed`. There is no retry loop: the
//! scheduler re-invokes on failure.

use super::appender::{AppendSummary, Appender};
use super::watermark::WatermarkReader;
use super::{IngestContext, IngestError, StorageWriteError};
use crate::normalize::normalize;
use crate::telemetry::{self, RunOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Idle,
    FetchingWatermark,
    FetchingCandles,
    Normalizing,
    Appending,
    Done,
    Failed,
}

/// Summary of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub market: String,
    /// Newest stored timestamp before the run, if it could be read
    pub watermark: Option<DateTime<Utc>>,
    /// `to` bound sent to the API
    pub upper_bound: Option<DateTime<Utc>>,
    /// Candles returned by the API
    pub fetched: usize,
    /// Candles that survived normalization
    pub normalized: usize,
    pub append: AppendSummary,
}

/// Sequences one ingestion run
pub struct Orchestrator<'a> {
    ctx: &'a IngestContext,
    state: IngestState,
}

impl<'a> Orchestrator<'a> {
    pub fn new(ctx: &'a IngestContext) -> Self {
        Self {
            ctx,
            state: IngestState::Idle,
        }
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    fn transition(&mut self, next: IngestState) {
        tracing::debug!(from = ?self.state, to = ?next, "State transition");
        self.state = next;
    }

    /// Run once against the current clock
    pub async fn run(&mut self) -> Result<RunReport, IngestError> {
        self.run_at(Utc::now()).await
    }

    /// Run once, treating `now` as the current time
    pub async fn run_at(&mut self, now: DateTime<Utc>) -> Result<RunReport, IngestError> {
        self.state = IngestState::Idle;

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("ingest", %run_id, market = %self.ctx.market);

        let result = self.execute(run_id, now).instrument(span).await;

        let outcome = match &result {
            Ok(_) => RunOutcome::Success,
            Err(IngestError::Network(_)) => RunOutcome::NetworkError,
            Err(IngestError::Storage(_)) => RunOutcome::StorageError,
        };
        self.transition(match outcome {
            RunOutcome::Success => IngestState::Done,
            _ => IngestState::Failed,
        });
        telemetry::record_run(outcome);

        result
    }

    async fn execute(
        &mut self,
        run_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RunReport, IngestError> {
        let ctx = self.ctx;

        self.transition(IngestState::FetchingWatermark);
        let watermark = WatermarkReader::new(ctx.warehouse.as_ref())
            .latest_timestamp()
            .await;

        // The watermark only decides whether the request is bounded at all;
        // the bound itself is the current time.
        let upper_bound = watermark.map(|_| now);

        self.transition(IngestState::FetchingCandles);
        let raw = ctx
            .source
            .fetch(&ctx.market, ctx.count, upper_bound)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Candle fetch failed"))?;

        let mut report = RunReport {
            run_id,
            market: ctx.market.clone(),
            watermark,
            upper_bound,
            fetched: raw.len(),
            normalized: 0,
            append: AppendSummary::default(),
        };

        if raw.is_empty() {
            tracing::info!("No data received from Upbit API");
            return Ok(report);
        }

        self.transition(IngestState::Normalizing);
        let rows = normalize(&raw);
        report.normalized = rows.len();
        if rows.len() < raw.len() {
            tracing::info!(
                dropped = raw.len() - rows.len(),
                "Dropped candles without a usable timestamp"
            );
        }

        self.transition(IngestState::Appending);
        let summary = Appender::new(ctx.warehouse.as_ref()).append(&rows).await?;

        if summary.has_failures() {
            let first = summary
                .failures
                .first()
                .map(ToString::to_string)
                .unwrap_or_default();
            return Err(StorageWriteError::Rows {
                attempted: summary.attempted,
                failed: summary.failed,
                first,
            }
            .into());
        }

        report.append = summary;
        Ok(report)
    }
}
