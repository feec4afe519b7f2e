//! Decentralized price feeder - entry point.
//!
//! Scrapes trades from centralized venues and on-chain pools, aggregates
//! them per tick (per-market filter, then cross-market metafilter) and
//! publishes the resulting asset prices to an on-chain oracle.

mod app;
mod trigger;

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Decentralized price feeder node.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Load markets from config files instead of the EXCHANGEPAIRS/POOLS
    /// environment variables.
    #[arg(long)]
    pub config_files: bool,

    /// Directory holding exchangePairs/, symbolIdentification/, pools/ and
    /// exchange_pairs/pairs.json.
    #[arg(long, default_value = "config")]
    pub config_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS crypto provider must be installed before any WS connection.
    feeder_ws::init_crypto();

    let args = Args::parse();
    feeder_telemetry::init_logging()?;

    info!("Starting feeder node v{}", env!("CARGO_PKG_VERSION"));
    app::run(args).await
}
