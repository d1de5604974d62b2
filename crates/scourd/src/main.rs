//! `Scour` daemon.
//!
//! Opens (or creates) a database directory, binds the TCP frontend and
//! runs the coordinator until the process is killed.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scour_broker::{Broker, TcpFrontend};
use scour_db::{ConfigKey, Database};

/// `Scour` indexed-search daemon.
#[derive(Parser)]
#[command(name = "scourd")]
#[command(about = "Scour indexed-search daemon", long_about = None)]
struct Cli {
    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:9281")]
    bind: SocketAddr,

    /// Database directory (created if missing).
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Worker pool size. Defaults to the `workers` config key.
    #[arg(short, long)]
    workers: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let db = Database::open(&cli.data_dir)
        .with_context(|| format!("failed to open database at {}", cli.data_dir.display()))?;
    let db = Arc::new(db);

    let pool_size = cli
        .workers
        .unwrap_or_else(|| db.snapshot().config().get(ConfigKey::Workers) as usize);

    let frontend = TcpFrontend::bind(cli.bind)
        .with_context(|| format!("failed to bind {}", cli.bind))?;

    info!(bind = %cli.bind, workers = pool_size, "scourd starting");

    let mut broker = Broker::new(db, frontend, pool_size)?;
    broker.run()?;
    Ok(())
}
