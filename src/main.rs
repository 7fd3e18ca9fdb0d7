mod bridge;
mod command;
mod config;
mod connection;
mod telemetry;

use bridge::{FlightBridge, SimulatedBridge};
use clap::Parser;
use command::CommandExecutor;
use config::AgentConfig;
use connection::{GroundApi, GroundLink, LinkConfig};
use std::sync::Arc;
use std::time::Duration;
use telemetry::TelemetryStreamer;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Vehicle-side agent: polls the ground queue and streams telemetry
#[derive(Parser, Debug)]
#[command(name = "dronepost-edge", version)]
struct Cli {
    /// Vehicle id commands are polled for
    #[arg(long)]
    device_id: Option<String>,

    /// Ground service address
    #[arg(long)]
    server: Option<String>,

    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Set to 0 to disable telemetry streaming
    #[arg(long)]
    telemetry_interval_ms: Option<u64>,

    /// Simulated vehicle home latitude
    #[arg(long, default_value_t = 37.7749)]
    home_lat: f64,

    /// Simulated vehicle home longitude
    #[arg(long, default_value_t = -122.4194)]
    home_lon: f64,
}

impl Cli {
    fn into_config(self) -> AgentConfig {
        let mut config = AgentConfig::default();
        if let Some(device_id) = self.device_id {
            config.device_id = device_id;
        }
        if let Some(server) = self.server {
            config.server = server;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = self.telemetry_interval_ms {
            config.telemetry_interval = Duration::from_millis(ms);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let home = (cli.home_lat, cli.home_lon);
    let config = cli.into_config();

    info!("Edge agent starting: {}", config.device_id);
    info!("  ground service: {}", config.server);

    let ground: Arc<dyn GroundApi> = Arc::new(GroundLink::connect(LinkConfig {
        device_id: config.device_id.clone(),
        server: config.server.clone(),
        reconnect_delay: config.reconnect_delay,
        max_reconnect_delay: config.max_reconnect_delay,
        connect_timeout: config.connect_timeout,
        request_timeout: config.request_timeout,
    }));
    let bridge: Arc<dyn FlightBridge> = Arc::new(SimulatedBridge::new(home.0, home.1));
    info!("Simulated vehicle at {:.5}, {:.5}", home.0, home.1);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if !config.telemetry_interval.is_zero() {
        let streamer = TelemetryStreamer::new(
            config.device_id.clone(),
            ground.clone(),
            bridge.clone(),
            config.telemetry_interval,
        );
        tokio::spawn(streamer.run(shutdown_rx.clone()));
    }

    let executor = CommandExecutor::new(config.device_id.clone(), ground, bridge);
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => match executor.poll_once().await {
                Ok(0) => {}
                Ok(n) => debug!(executed = n, "poll cycle done"),
                Err(e) => warn!(error = %e, "poll failed"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    let unreported = executor.unreported_count().await;
    if unreported > 0 {
        warn!(unreported, "exiting with command outcomes not yet reported");
    }
    Ok(())
}
