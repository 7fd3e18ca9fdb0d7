//! dronepost-server: the ground service daemon
//!
//! ```text
//! dronepost-server --config /etc/dronepost/server.toml --listen 0.0.0.0:8080
//! ```

use clap::Parser;
use dronepost_server::config::StorageBackend;
use dronepost_server::retention::RetentionSweeper;
use dronepost_server::{session, GroundStation, ServerConfig, Store};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dronepost-server", about = "DronePost ground service")]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to accept vehicle and operator connections on.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Data directory for the redb database.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Storage backend.
    #[arg(long, value_enum)]
    backend: Option<StorageBackend>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(data_dir) = self.data_dir {
            config.storage.data_dir = data_dir;
        }
        if let Some(backend) = self.backend {
            config.storage.backend = backend;
        }
        config.validate()?;
        Ok(config)
    }
}

fn open_store(config: &ServerConfig) -> anyhow::Result<Store> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("using in-memory storage; data is lost on exit");
            Ok(Store::in_memory())
        }
        StorageBackend::Redb => {
            std::fs::create_dir_all(&config.storage.data_dir)?;
            let path = config.database_path();
            let store = Store::open(&path)?;
            info!(path = ?path, "redb store opened");
            Ok(store)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config()?;
    let store = open_store(&config)?;

    let station = GroundStation::new(store, &config.queries)
        .with_retention_days(config.retention.telemetry_days);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = RetentionSweeper::new(
        station.telemetry.clone(),
        config.retention.telemetry_days,
        config.sweep_interval(),
    );
    let sweeper_shutdown = shutdown_rx.clone();
    let sweeper_handle = tokio::spawn(async move { sweeper.run(sweeper_shutdown).await });

    let listener = TcpListener::bind(config.listen).await?;
    info!(addr = %config.listen, "ground service listening");

    let server = tokio::spawn(session::accept_loop(listener, station, shutdown_rx));

    // Graceful shutdown on Ctrl-C
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    server.await??;
    let _ = sweeper_handle.await;

    info!("ground service stopped");
    Ok(())
}
