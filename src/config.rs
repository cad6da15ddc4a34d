//! Configuration types for candle-ingest
//!
//! Loaded from TOML; every section and field has a default so an empty or
//! missing file still yields a working configuration. A few values can be
//! overridden from the environment, see [`Config::apply_env`].

use crate::feed::{DEFAULT_MARKET, UPBIT_API_URL};
use crate::ingest::DEFAULT_CANDLE_COUNT;
use crate::telemetry::LogFormat;
use crate::warehouse::{
    TableRef, BIGQUERY_API_URL, DEFAULT_DATASET, DEFAULT_PROJECT_ID, DEFAULT_TABLE,
};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable overriding `warehouse.project_id`
pub const PROJECT_ID_ENV: &str = "GCP_PROJECT_ID";
/// Environment variable supplying the BigQuery access token
pub const ACCESS_TOKEN_ENV: &str = "BIGQUERY_ACCESS_TOKEN";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Candle feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub base_url: String,
    /// Market code to ingest
    #[serde(default = "default_market")]
    pub market: String,
    /// Candles per request (Upbit rejects more than 200)
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
}

fn default_feed_url() -> String {
    UPBIT_API_URL.to_string()
}
fn default_market() -> String {
    DEFAULT_MARKET.to_string()
}
fn default_count() -> u32 {
    DEFAULT_CANDLE_COUNT
}
fn default_feed_timeout() -> u64 {
    10
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_feed_url(),
            market: default_market(),
            count: default_count(),
            timeout_secs: default_feed_timeout(),
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackend {
    #[default]
    BigQuery,
    Parquet,
    Memory,
}

/// Warehouse configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default)]
    pub backend: WarehouseBackend,
    #[serde(default = "default_project_id")]
    pub project_id: String,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_table")]
    pub table: String,
    /// BigQuery REST base URL
    #[serde(default = "default_bigquery_url")]
    pub api_base_url: String,
    /// BigQuery OAuth2 access token
    #[serde(default)]
    pub access_token: Option<String>,
    /// Directory used by the Parquet backend
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_warehouse_timeout")]
    pub timeout_secs: u64,
}

fn default_project_id() -> String {
    DEFAULT_PROJECT_ID.to_string()
}
fn default_dataset() -> String {
    DEFAULT_DATASET.to_string()
}
fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}
fn default_bigquery_url() -> String {
    BIGQUERY_API_URL.to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./data/candles")
}
fn default_warehouse_timeout() -> u64 {
    30
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            backend: WarehouseBackend::default(),
            project_id: default_project_id(),
            dataset: default_dataset(),
            table: default_table(),
            api_base_url: default_bigquery_url(),
            access_token: None,
            output_dir: default_output_dir(),
            timeout_secs: default_warehouse_timeout(),
        }
    }
}

impl WarehouseConfig {
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(&self.project_id, &self.dataset, &self.table)
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(project) = lookup(PROJECT_ID_ENV) {
            self.warehouse.project_id = project;
        }
        if let Some(token) = lookup(ACCESS_TOKEN_ENV) {
            self.warehouse.access_token = Some(token);
        }
    }
}
