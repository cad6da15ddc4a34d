//! candle-ingest: hourly Upbit candle ingestion
//!
//! This library provides the core components for:
//! - Fetching hourly candles from the Upbit REST API
//! - Normalizing raw candles into typed warehouse rows
//! - Reading the stored watermark
//! - Append-only writes tolerating duplicate rows
//! - A once-per-trigger ingestion orchestrator
//! - BigQuery, Parquet and in-memory warehouse backends
//! - The recent-prices read used by the dashboard

pub mod cli;
pub mod config;
pub mod feed;
pub mod ingest;
pub mod normalize;
pub mod telemetry;
pub mod warehouse;
