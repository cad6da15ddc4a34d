use candle_ingest::cli::{Cli, Commands};
use candle_ingest::config::Config;
use candle_ingest::ingest::WatermarkReader;
use candle_ingest::warehouse;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });
    config.apply_env();

    // Initialize telemetry
    candle_ingest::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Ingest(args) => return args.execute(&config).await,
        Commands::Recent(args) => {
            args.execute(&config).await?;
        }
        Commands::Watermark => {
            let warehouse = warehouse::from_config(&config.warehouse)?;
            match WatermarkReader::new(warehouse.as_ref())
                .latest_timestamp()
                .await
            {
                Some(ts) => println!("{}", candle_ingest::normalize::format_timestamp(ts)),
                None => println!("none"),
            }
        }
        Commands::Config => {
            println!("Current configuration:");
            println!(
                "  Feed: {} {} x{} ({}s timeout)",
                config.feed.base_url,
                config.feed.market,
                config.feed.count,
                config.feed.timeout_secs
            );
            println!(
                "  Warehouse: {:?} {}",
                config.warehouse.backend,
                config.warehouse.table_ref()
            );
            println!("  Output dir: {}", config.warehouse.output_dir.display());
            println!(
                "  Access token: {}",
                if config.warehouse.access_token.is_some() {
                    "set"
                } else {
                    "not set"
                }
            );
            println!(
                "  Logging: {} {:?}",
                config.telemetry.log_level, config.telemetry.log_format
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
