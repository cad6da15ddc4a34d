//! Ingest command implementation

use crate::config::Config;
use crate::ingest::{handle_trigger, IngestContext};
use clap::Args;
use std::process::ExitCode;

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Market code, overriding `feed.market`
    #[arg(short, long)]
    pub market: Option<String>,

    /// Candles to request, overriding `feed.count` (Upbit allows at most 200)
    #[arg(short = 'n', long)]
    pub count: Option<u32>,
}

impl IngestArgs {
    /// Run one pass; the process exits non-zero when the trigger reports 500
    pub async fn execute(&self, config: &Config) -> anyhow::Result<ExitCode> {
        let mut ctx = IngestContext::from_config(config)?;
        if let Some(market) = &self.market {
            ctx.market = market.clone();
        }
        if let Some(count) = self.count {
            ctx.count = count;
        }

        let (message, status) = handle_trigger(&ctx, ()).await;
        println!("{}", message);

        Ok(if status == 200 {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}
