//! Recent prices command implementation
//!
//! Text rendering of the dashboard read query.

use crate::config::Config;
use crate::normalize::{format_timestamp, PricePoint};
use crate::warehouse;
use clap::Args;
use std::fmt::Write;

#[derive(Args, Debug)]
pub struct RecentArgs {
    /// Number of rows to show
    #[arg(short, long, default_value_t = 100)]
    pub limit: usize,
}

impl RecentArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let warehouse = warehouse::from_config(&config.warehouse)?;
        let points = warehouse.recent_prices(self.limit).await?;

        if points.is_empty() {
            println!("No rows found in {}", warehouse.target());
            return Ok(());
        }

        print!("{}", render_table(&points));
        Ok(())
    }
}

/// Render price points as a fixed-width table, times in UTC
pub fn render_table(points: &[PricePoint]) -> String {
    let market_width = points
        .iter()
        .map(|p| p.market.len())
        .chain(std::iter::once("MARKET".len()))
        .max()
        .unwrap_or_default();

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<27}  {:<market_width$}  {:>18}",
        "TIMESTAMP (UTC)", "MARKET", "PRICE"
    );
    for point in points {
        let price = point
            .price
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<27}  {:<market_width$}  {:>18}",
            format_timestamp(point.timestamp),
            point.market,
            price
        );
    }
    out
}
