//! Centralized configuration service
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────────────────────────────────────────────┐
//!                   │                      CONFIG CENTER                            │
//!                   │                                                               │
//!   Operator        │  ┌─────────┐    ┌──────────┐    ┌────────────┐                │
//!   REST request ───┼─▶│  http   │───▶│   api    │───▶│  catalog   │                │
//!                   │  │ server  │    │ handlers │    │ versioning │                │
//!                   │  └─────────┘    └──────────┘    └─────┬──────┘                │
//!                   │                                       │                       │
//!                   │                                       ▼                       │
//!                   │                               ┌──────────────┐                │
//!                   │                               │ inheritance  │                │
//!                   │                               │   resolver   │                │
//!                   │                               └──────┬───────┘                │
//!                   │                                      ▼                        │
//!   Client runtime  │  ┌──────────┐   ┌─────────────┐  ┌──────────────┐             │
//!   ◀═══ /ws ═══════┼══│websocket │◀══│    push     │◀─│  snapshots   │ publish     │
//!                   │  │ session  │   │ distributor │  │   manager    │             │
//!                   │  └──────────┘   └─────────────┘  └──────────────┘             │
//!                   │                                                               │
//!                   │  ┌─────────────────────────────────────────────────────────┐  │
//!                   │  │                 Cross-Cutting Concerns                  │  │
//!                   │  │  config + watcher │ observability │ storage │ lifecycle │  │
//!                   │  └─────────────────────────────────────────────────────────┘  │
//!                   └──────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use config_center::config::{load_config, ServiceConfig};
use config_center::lifecycle::startup;
use config_center::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "config-center")]
#[command(about = "Centralized configuration service", long_about = None)]
struct Args {
    /// TOML config file; watched for `[push]` changes while running.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "config-center starting");

    startup::run(config, args.config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
