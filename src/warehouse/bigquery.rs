//! BigQuery warehouse over the REST API
//!
//! Reads go through `jobs.query` (standard SQL), writes through
//! `tabledata.insertAll` with `skipInvalidRows` so a bad row never blocks the
//! rest of the batch. Each row carries its natural key as `insertId`, which
//! lets BigQuery drop retried rows on a best-effort basis.
//!
//! Authentication is a plain bearer token obtained elsewhere; without one no
//! `Authorization` header is sent, which is what local emulators expect.

use super::{RowError, TableRef, Warehouse, WarehouseError};
use crate::normalize::{format_timestamp, NormalizedRow, PricePoint};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// BigQuery REST base URL
pub const BIGQUERY_API_URL: &str = "https://bigquery.googleapis.com";

/// Server-side wait for a synchronous query
const QUERY_TIMEOUT_MS: u64 = 10_000;

/// Configuration for the BigQuery backend
#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub api_base_url: String,
    pub table: TableRef,
    /// OAuth2 access token
    pub access_token: Option<String>,
    /// HTTP request timeout
    pub timeout: Duration,
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            api_base_url: BIGQUERY_API_URL.to_string(),
            table: TableRef::default(),
            access_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// BigQuery-backed candle table
pub struct BigQueryWarehouse {
    config: BigQueryConfig,
    client: Client,
}

impl BigQueryWarehouse {
    pub fn new(config: BigQueryConfig) -> Result<Self, WarehouseError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn table(&self) -> &TableRef {
        &self.config.table
    }

    fn base_url(&self) -> &str {
        self.config.api_base_url.trim_end_matches('/')
    }

    fn query_url(&self) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/queries",
            self.base_url(),
            self.config.table.project
        )
    }

    fn insert_all_url(&self) -> String {
        let table = &self.config.table;
        format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables/{}/insertAll",
            self.base_url(),
            table.project,
            table.dataset,
            table.table
        )
    }

    fn max_timestamp_sql(&self) -> String {
        format!("SELECT MAX(timestamp) FROM {}", self.config.table.sql_ident())
    }

    fn recent_prices_sql(&self) -> String {
        format!(
            "SELECT market, closing_price AS price, timestamp FROM {} \
             ORDER BY timestamp DESC LIMIT @limit",
            self.config.table.sql_ident()
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R, WarehouseError> {
        let response = self.authorize(self.client.post(url)).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WarehouseError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn run_query(
        &self,
        query: String,
        parameters: Vec<QueryParameter>,
    ) -> Result<Vec<TableRow>, WarehouseError> {
        let request = QueryRequest::new(query, parameters);
        tracing::debug!(query = %request.query, "Running BigQuery query");

        let response: QueryResponse = self.post_json(&self.query_url(), &request).await?;

        if let Some(error) = response.errors.first() {
            return Err(WarehouseError::Query(format!(
                "{}: {}",
                error.reason, error.message
            )));
        }
        if !response.job_complete {
            return Err(WarehouseError::Query(format!(
                "query did not complete within {} ms",
                QUERY_TIMEOUT_MS
            )));
        }

        Ok(response.rows)
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    fn target(&self) -> String {
        self.config.table.to_string()
    }

    async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, WarehouseError> {
        let rows = self.run_query(self.max_timestamp_sql(), Vec::new()).await?;

        match rows.first().and_then(|row| row.f.first()) {
            Some(cell) => parse_timestamp_cell(&cell.v),
            None => Ok(None),
        }
    }

    async fn insert_rows(&self, rows: &[NormalizedRow]) -> Result<Vec<RowError>, WarehouseError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let request = InsertAllRequest::new(rows);
        let response: InsertAllResponse = self.post_json(&self.insert_all_url(), &request).await?;

        tracing::debug!(
            table = %self.config.table,
            submitted = rows.len(),
            insert_errors = response.insert_errors.len(),
            "BigQuery insertAll finished"
        );

        Ok(response
            .insert_errors
            .into_iter()
            .map(|e| e.into_row_error(rows))
            .collect())
    }

    async fn recent_prices(&self, limit: usize) -> Result<Vec<PricePoint>, WarehouseError> {
        let parameters = vec![QueryParameter::int64("limit", limit as i64)];
        let rows = self.run_query(self.recent_prices_sql(), parameters).await?;

        rows.iter().map(parse_price_row).collect()
    }
}

/// `jobs.query` request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    query: String,
    use_legacy_sql: bool,
    timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameter_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    query_parameters: Vec<QueryParameter>,
    format_options: FormatOptions,
}

impl QueryRequest {
    fn new(query: String, query_parameters: Vec<QueryParameter>) -> Self {
        Self {
            query,
            use_legacy_sql: false,
            timeout_ms: QUERY_TIMEOUT_MS,
            parameter_mode: (!query_parameters.is_empty()).then_some("NAMED"),
            query_parameters,
            format_options: FormatOptions {
                use_int64_timestamp: true,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FormatOptions {
    use_int64_timestamp: bool,
}

/// Named query parameter
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryParameter {
    name: String,
    parameter_type: ParameterType,
    parameter_value: ParameterValue,
}

impl QueryParameter {
    fn int64(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            parameter_type: ParameterType {
                kind: "INT64".to_string(),
            },
            parameter_value: ParameterValue {
                value: value.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ParameterType {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize)]
struct ParameterValue {
    value: String,
}

/// `jobs.query` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

/// `tabledata.insertAll` request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRequest<'a> {
    skip_invalid_rows: bool,
    rows: Vec<InsertRow<'a>>,
}

impl<'a> InsertAllRequest<'a> {
    fn new(rows: &'a [NormalizedRow]) -> Self {
        Self {
            skip_invalid_rows: true,
            rows: rows
                .iter()
                .map(|row| InsertRow {
                    insert_id: row.key().to_string(),
                    json: StoredRow::from(row),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRow<'a> {
    insert_id: String,
    json: StoredRow<'a>,
}

/// Row as the table schema names its columns
#[derive(Debug, Serialize)]
struct StoredRow<'a> {
    timestamp: String,
    market: Option<&'a str>,
    opening_price: Option<f64>,
    high_price: Option<f64>,
    low_price: Option<f64>,
    closing_price: Option<f64>,
    trade_volume: Option<f64>,
}

impl<'a> From<&'a NormalizedRow> for StoredRow<'a> {
    fn from(row: &'a NormalizedRow) -> Self {
        Self {
            timestamp: format_timestamp(row.timestamp),
            market: row.market.as_deref(),
            opening_price: row.opening_price,
            high_price: row.high_price,
            low_price: row.low_price,
            closing_price: row.closing_price,
            trade_volume: row.trade_volume,
        }
    }
}

/// `tabledata.insertAll` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertError>,
}

#[derive(Debug, Deserialize)]
struct InsertError {
    index: usize,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

impl InsertError {
    fn into_row_error(self, rows: &[NormalizedRow]) -> RowError {
        let reason = self
            .errors
            .first()
            .map(|e| e.reason.clone())
            .unwrap_or_default();
        let message = self
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        RowError {
            index: self.index,
            key: rows.get(self.index).map(NormalizedRow::key),
            reason,
            message,
        }
    }
}

/// Decode a TIMESTAMP cell.
///
/// Integer microseconds when `useInt64Timestamp` is honoured, otherwise
/// floating-point epoch seconds such as `"1.7040672E9"`.
fn parse_timestamp_cell(value: &Value) -> Result<Option<DateTime<Utc>>, WarehouseError> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::String(s) => s.as_str(),
        other => {
            return Err(WarehouseError::Query(format!(
                "unexpected TIMESTAMP cell: {}",
                other
            )))
        }
    };

    let micros = match text.parse::<i64>() {
        Ok(micros) => micros,
        Err(_) => {
            let seconds: f64 = text.parse().map_err(|_| {
                WarehouseError::Query(format!("unparseable TIMESTAMP cell: {}", text))
            })?;
            (seconds * 1_000_000.0).round() as i64
        }
    };

    DateTime::from_timestamp_micros(micros)
        .map(Some)
        .ok_or_else(|| WarehouseError::Query(format!("TIMESTAMP out of range: {}", text)))
}

fn parse_price_row(row: &TableRow) -> Result<PricePoint, WarehouseError> {
    static NULL: Value = Value::Null;
    let cell = |i: usize| row.f.get(i).map_or(&NULL, |c| &c.v);

    let market = cell(0).as_str().unwrap_or_default().to_string();
    let price = crate::normalize::coerce_f64(Some(cell(1)));
    let timestamp = parse_timestamp_cell(cell(2))?
        .ok_or_else(|| WarehouseError::Query("row without timestamp".to_string()))?;

    Ok(PricePoint {
        market,
        price,
        timestamp,
    })
}
