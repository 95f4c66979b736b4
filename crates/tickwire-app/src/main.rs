//! tickwire - real-time market quote sync engine.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Real-time market quote sync engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TICKWIRE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Search the instrument catalog, print the matches and exit
    #[arg(short, long)]
    search: Option<String>,

    /// Subscribe to a symbol outside the watchlist (repeatable)
    #[arg(long = "select", value_name = "SYMBOL")]
    select: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection is made
    tickwire_ws::init_crypto();

    let args = Args::parse();

    tickwire_telemetry::init_logging()?;

    info!("Starting tickwire v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > TICKWIRE_CONFIG > default
    let config_path = args
        .config
        .or_else(|| std::env::var("TICKWIRE_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = tickwire_app::AppConfig::from_file(&config_path)?;
    info!(ws_url = %config.ws_url, api_base_url = %config.api_base_url, "Configuration loaded");

    let app = tickwire_app::Application::new(config).await?;

    if let Some(query) = args.search {
        let results = app.search(&query);
        if results.is_empty() {
            println!("No matches for {query:?}");
        }
        for instrument in results {
            match &instrument.short_name {
                Some(short) => println!("{:<12} {:<40} {}", instrument.symbol, short, instrument.key),
                None => println!("{:<12} {:<40} {}", instrument.symbol, instrument.name, instrument.key),
            }
        }
        return Ok(());
    }

    if !args.select.is_empty() {
        app.select_symbols(&args.select).await;
    }

    app.run().await?;

    Ok(())
}
