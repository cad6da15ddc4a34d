//! End-to-end ingestion runs against stubbed Upbit and warehouse endpoints

use crate::support::{upbit_candles_json, StubServer};
use candle_ingest::config::{Config, WarehouseBackend};
use candle_ingest::feed::{UpbitClient, UpbitConfig};
use candle_ingest::ingest::{handle_trigger, IngestContext, IngestState, Orchestrator, SUCCESS_MESSAGE};
use candle_ingest::normalize::NormalizedRow;
use candle_ingest::warehouse::{MemoryWarehouse, ParquetWarehouse, Warehouse};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

const CANDLES_PATH: &str = "/v1/candles/minutes/60";

fn upbit(server: &StubServer) -> Box<UpbitClient> {
    Box::new(
        UpbitClient::with_config(UpbitConfig {
            base_url: server.url.clone(),
            timeout: Duration::from_secs(5),
        })
        .unwrap(),
    )
}

fn stored(hour: u32) -> NormalizedRow {
    NormalizedRow {
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
        market: Some("KRW-BTC".to_string()),
        opening_price: None,
        high_price: None,
        low_price: None,
        closing_price: Some(1.0),
        trade_volume: None,
    }
}

#[tokio::test]
async fn test_trigger_ingests_into_empty_table() {
    let server = StubServer::builder()
        .route(CANDLES_PATH, 200, upbit_candles_json())
        .start()
        .await;
    let warehouse = Arc::new(MemoryWarehouse::new());
    let ctx = IngestContext::new(upbit(&server), Box::new(warehouse.clone()));

    let (message, status) = handle_trigger(&ctx, ()).await;

    assert_eq!(status, 200);
    assert_eq!(message, SUCCESS_MESSAGE);

    let rows = warehouse.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap());
    assert_eq!(rows[0].closing_price, Some(58_050_000.0));
    assert_eq!(rows[1].trade_volume, Some(155.25));

    // Empty table: no upper bound
    let requests = server.requests_to(CANDLES_PATH);
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].target.contains("to="));
}

#[tokio::test]
async fn test_existing_watermark_bounds_request() {
    let server = StubServer::builder()
        .route(CANDLES_PATH, 200, upbit_candles_json())
        .start()
        .await;
    let warehouse = Arc::new(MemoryWarehouse::with_rows(vec![stored(0)]));
    let ctx = IngestContext::new(upbit(&server), Box::new(warehouse.clone()));

    let now = Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap();
    let report = Orchestrator::new(&ctx).run_at(now).await.unwrap();

    assert_eq!(report.watermark, Some(stored(0).timestamp));
    assert_eq!(report.upper_bound, Some(now));
    assert!(server.requests_to(CANDLES_PATH)[0]
        .target
        .ends_with("&to=2024-01-01T02%3A00%3A00Z"));

    // The stored 00:00 row is rejected as a duplicate, not overwritten
    assert_eq!(report.append.duplicates, 1);
    assert_eq!(report.append.accepted, 1);
    let rows = warehouse.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].closing_price, Some(1.0));
}

#[tokio::test]
async fn test_fetch_failure_writes_nothing() {
    let server = StubServer::builder()
        .route(CANDLES_PATH, 500, r#"{"error":"upstream"}"#)
        .start()
        .await;
    let warehouse = Arc::new(MemoryWarehouse::new());
    let ctx = IngestContext::new(upbit(&server), Box::new(warehouse.clone()));

    let (message, status) = handle_trigger(&ctx, ()).await;

    assert_eq!(status, 500);
    assert!(message.starts_with("Network or API request error:"));
    assert_eq!(warehouse.insert_calls(), 0);
    assert!(warehouse.rows().is_empty());
}

#[tokio::test]
async fn test_watermark_failure_still_ingests() {
    let server = StubServer::builder()
        .route(CANDLES_PATH, 200, upbit_candles_json())
        .start()
        .await;
    let warehouse = Arc::new(MemoryWarehouse::new());
    warehouse.fail_reads(true);
    let ctx = IngestContext::new(upbit(&server), Box::new(warehouse.clone()));

    let mut orchestrator = Orchestrator::new(&ctx);
    let report = orchestrator.run().await.unwrap();

    assert_eq!(orchestrator.state(), IngestState::Done);
    assert_eq!(report.watermark, None);
    assert_eq!(report.upper_bound, None);
    assert_eq!(warehouse.rows().len(), 2);
    assert!(!server.requests_to(CANDLES_PATH)[0].target.contains("to="));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let server = StubServer::builder()
        .route(CANDLES_PATH, 200, upbit_candles_json())
        .start()
        .await;
    let warehouse = Arc::new(MemoryWarehouse::new());
    let ctx = IngestContext::new(upbit(&server), Box::new(warehouse.clone()));

    assert_eq!(handle_trigger(&ctx, ()).await.1, 200);
    assert_eq!(handle_trigger(&ctx, ()).await.1, 200);

    assert_eq!(warehouse.rows().len(), 2);
    assert_eq!(warehouse.insert_calls(), 2);
}

#[tokio::test]
async fn test_row_rejection_fails_run() {
    let server = StubServer::builder()
        .route(CANDLES_PATH, 200, upbit_candles_json())
        .start()
        .await;
    let warehouse = Arc::new(MemoryWarehouse::new());
    warehouse.reject_market("KRW-BTC");
    let ctx = IngestContext::new(upbit(&server), Box::new(warehouse.clone()));

    let (message, status) = handle_trigger(&ctx, ()).await;

    assert_eq!(status, 500);
    assert!(message.starts_with("An unexpected error occurred during ingestion:"));
}

#[tokio::test]
async fn test_candle_without_market_surfaces_as_storage_failure() {
    let body = serde_json::json!([
        {"candle_date_time_utc": "2024-01-01T01:00:00", "trade_price": 105.0},
        {"market": "KRW-BTC", "candle_date_time_utc": "2024-01-01T00:00:00", "trade_price": 104.0}
    ])
    .to_string();
    let server = StubServer::builder()
        .route(CANDLES_PATH, 200, body)
        .start()
        .await;
    let warehouse = Arc::new(MemoryWarehouse::new());
    let ctx = IngestContext::new(upbit(&server), Box::new(warehouse.clone()));

    let (message, status) = handle_trigger(&ctx, ()).await;

    assert_eq!(status, 500);
    assert!(message.starts_with("An unexpected error occurred during ingestion:"));
    assert!(message.contains("no market"));
    let rows = warehouse.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].closing_price, Some(104.0));
}

#[tokio::test]
async fn test_empty_response_succeeds_without_writes() {
    let server = StubServer::builder()
        .route(CANDLES_PATH, 200, "[]")
        .start()
        .await;
    let warehouse = Arc::new(MemoryWarehouse::new());
    let ctx = IngestContext::new(upbit(&server), Box::new(warehouse.clone()));

    let (_, status) = handle_trigger(&ctx, ()).await;

    assert_eq!(status, 200);
    assert_eq!(warehouse.insert_calls(), 0);
}

#[tokio::test]
async fn test_bigquery_pipeline_from_config() {
    let server = StubServer::builder()
        .route(CANDLES_PATH, 200, upbit_candles_json())
        .route(
            "/queries",
            200,
            r#"{"jobComplete":true,"rows":[{"f":[{"v":"1704067200000000"}]}]}"#,
        )
        .route("/insertAll", 200, "{}")
        .start()
        .await;

    let mut config = Config::default();
    config.feed.base_url = server.url.clone();
    config.warehouse.backend = WarehouseBackend::BigQuery;
    config.warehouse.api_base_url = server.url.clone();
    config.warehouse.project_id = "test-project".to_string();
    config.warehouse.access_token = Some("token".to_string());

    let ctx = IngestContext::from_config(&config).unwrap();
    let (message, status) = handle_trigger(&ctx, ()).await;
    assert_eq!(status, 200, "{}", message);

    assert_eq!(server.requests_to("/queries").len(), 1);
    let fetch = &server.requests_to(CANDLES_PATH)[0];
    assert!(fetch.target.contains("market=KRW-BTC&count=200&to="));

    let insert = server.requests_to("/insertAll")[0].json();
    assert_eq!(insert["rows"].as_array().unwrap().len(), 2);
    assert_eq!(insert["rows"][1]["json"]["trade_volume"], 155.25);
}

#[tokio::test]
async fn test_parquet_pipeline_from_config() {
    let server = StubServer::builder()
        .route(CANDLES_PATH, 200, upbit_candles_json())
        .start()
        .await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.feed.base_url = server.url.clone();
    config.warehouse.backend = WarehouseBackend::Parquet;
    config.warehouse.output_dir = dir.path().to_path_buf();

    let ctx = IngestContext::from_config(&config).unwrap();
    assert_eq!(handle_trigger(&ctx, ()).await.1, 200);
    assert_eq!(handle_trigger(&ctx, ()).await.1, 200);

    let warehouse = ParquetWarehouse::new(dir.path());
    assert_eq!(warehouse.read_all().unwrap().len(), 2);

    let recent = warehouse.recent_prices(1).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].price, Some(58_050_000.0));
}
