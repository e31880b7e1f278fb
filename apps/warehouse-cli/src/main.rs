//! Warehouse CLI
//!
//! Inspect and edit the shelf layout and the notes board from a terminal,
//! against the local cache or the configured remote.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use warehouse_sync::{SqliteStorage, SyncConfig, Warehouse};

use commands::Command;

#[derive(Parser, Debug)]
#[command(name = "warehouse", version, about = "Warehouse layout and notes")]
struct Args {
    /// TOML config file; environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Local cache database
    #[arg(long)]
    db: Option<PathBuf>,

    /// Ignore any configured remote
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("warehouse")
        .join("cache.sqlite")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so command output stays pipeable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::from_env(),
    };
    if args.offline {
        config.offline = true;
    }

    let db = args.db.clone().unwrap_or_else(default_db_path);
    if let Some(parent) = db.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let storage = Arc::new(SqliteStorage::open(&db)?);

    let warehouse = Warehouse::connect(Arc::new(config), storage)?;
    if let Err(e) = warehouse.load().await {
        tracing::warn!("Starting with empty data: {}", e);
    }

    commands::run(&warehouse, args.command).await
}
