//! Integration tests for candle-ingest

mod e2e_test;
mod feed_test;
mod support;
