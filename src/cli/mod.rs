//! CLI interface for candle-ingest
//!
//! Provides subcommands for:
//! - `ingest`: Run one ingestion pass
//! - `recent`: Show the most recent stored prices
//! - `watermark`: Show the newest stored candle time
//! - `config`: Show the effective configuration

mod ingest;
mod recent;

pub use ingest::IngestArgs;
pub use recent::{render_table, RecentArgs};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "candle-ingest")]
#[command(about = "Hourly Upbit candle ingestion into a warehouse table")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one ingestion pass
    Ingest(IngestArgs),
    /// Show the most recent stored prices
    Recent(RecentArgs),
    /// Show the newest stored candle time
    Watermark,
    /// Show the effective configuration
    Config,
}
