//! georeplica region node
//!
//! One serving instance of one region: local writes with asynchronous
//! replication to backup regions, a two-tier cache, geo routing advice and
//! TTL-based cross-region health.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                 REGION NODE                  │
//!   Client / peer region  │  ┌──────────┐     ┌────────────────────────┐ │
//!   ──────────────────────┼─▶│   http   │────▶│          node          │ │
//!                         │  │  server  │     │ write / read / ingress │ │
//!                         │  └──────────┘     └──┬──────────┬──────────┘ │
//!                         │                      │          │            │
//!                         │            ┌─────────▼──┐   ┌───▼─────────┐  │
//!                         │            │   cache    │   │ replication │──┼──▶ backup regions
//!                         │            │ local+glob │   │ queue+pool  │  │
//!                         │            └────────────┘   └─────────────┘  │
//!                         │  ┌──────────┐ ┌──────────┐ ┌───────────────┐ │
//!                         │  │   geo    │ │  health  │ │ observability │ │
//!                         │  │ routing  │ │ hb + lag │ │ logs/metrics  │ │
//!                         │  └──────────┘ └──────────┘ └───────────────┘ │
//!                         └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use georeplica::config::{load_config, NodeConfig};
use georeplica::lifecycle;
use georeplica::observability::logging;

#[derive(Parser)]
#[command(name = "georeplica")]
#[command(about = "Multi-region replication and geo-routing node", long_about = None)]
struct Cli {
    /// TOML config file. Without one the built-in three-region layout is used.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `node.region_id`.
    #[arg(long)]
    region: Option<String>,

    /// Override `node.bind_address`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => NodeConfig::default(),
    };
    if let Some(region) = cli.region {
        config.node.region_id = region;
    }
    if let Some(bind) = cli.bind {
        config.node.bind_address = bind;
    }

    logging::init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        region = %config.node.region_id,
        bind_address = %config.node.bind_address,
        regions = config.regions.len(),
        "georeplica starting"
    );

    lifecycle::run(config).await?;
    Ok(())
}
