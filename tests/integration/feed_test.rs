//! Integration tests for the Upbit candle client

use crate::support::{closed_port_url, upbit_candles_json, StubServer};
use candle_ingest::feed::{CandleSource, FetchError, UpbitClient, UpbitConfig};
use chrono::{TimeZone, Utc};
use std::time::Duration;

fn client(base_url: &str) -> UpbitClient {
    UpbitClient::with_config(UpbitConfig {
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn test_fetch_unbounded() {
    let server = StubServer::builder()
        .route("/v1/candles/minutes/60", 200, upbit_candles_json())
        .start()
        .await;

    let candles = client(&server.url)
        .fetch("KRW-BTC", 200, None)
        .await
        .unwrap();

    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0].market.as_deref(), Some("KRW-BTC"));
    assert_eq!(
        candles[0].candle_date_time_utc.as_deref(),
        Some("2024-01-01T01:00:00")
    );

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(
        requests[0].target,
        "/v1/candles/minutes/60?market=KRW-BTC&count=200"
    );
    assert_eq!(requests[0].header("accept"), Some("application/json"));
}

#[tokio::test]
async fn test_fetch_bounded_sends_to() {
    let server = StubServer::builder()
        .route("/v1/candles/minutes/60", 200, "[]")
        .start()
        .await;

    let to = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let candles = client(&server.url)
        .fetch("KRW-ETH", 24, Some(to))
        .await
        .unwrap();

    assert!(candles.is_empty());
    assert_eq!(
        server.requests()[0].target,
        "/v1/candles/minutes/60?market=KRW-ETH&count=24&to=2024-01-01T12%3A00%3A00Z"
    );
}

#[tokio::test]
async fn test_fetch_error_status() {
    let server = StubServer::builder()
        .route(
            "/v1/candles/minutes/60",
            500,
            r#"{"error":{"name":"server_error"}}"#,
        )
        .start()
        .await;

    let err = client(&server.url)
        .fetch("KRW-BTC", 200, None)
        .await
        .unwrap_err();

    match err {
        FetchError::Status { status, body } => {
            assert_eq!(status.as_u16(), 500);
            assert!(body.contains("server_error"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_malformed_body() {
    let server = StubServer::builder()
        .route("/v1/candles/minutes/60", 200, r#"{"not":"an array"}"#)
        .start()
        .await;

    let err = client(&server.url)
        .fetch("KRW-BTC", 200, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));
}

#[tokio::test]
async fn test_fetch_connection_refused() {
    let url = closed_port_url().await;
    let err = client(&url).fetch("KRW-BTC", 200, None).await.unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)));
}
