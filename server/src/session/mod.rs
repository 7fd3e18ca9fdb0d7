//! Client sessions over TCP
//!
//! This module handles:
//! - Accepting vehicle and operator connections
//! - Framing requests and responses with the shared codec
//! - Closing every session on shutdown

mod connection;

pub use connection::{DeviceSession, Inbound, GROUND_DEVICE_ID};

use crate::station::GroundStation;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Accept connections until shutdown, serving each on its own task
pub async fn accept_loop(
    listener: TcpListener,
    station: GroundStation,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, addr) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                if let Err(e) = socket.set_nodelay(true) {
                    warn!(%addr, error = %e, "failed to set TCP_NODELAY");
                }

                let session = DeviceSession::new(socket, addr);
                let station = station.clone();
                let shutdown = shutdown.clone();
                sessions.spawn(async move {
                    if let Err(e) = session.serve(station, shutdown).await {
                        warn!(%addr, error = %e, "session failed");
                    }
                });
            }
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "session task panicked");
                }
            }
            _ = shutdown.changed() => {
                info!(open = sessions.len(), "listener stopping");
                break;
            }
        }
    }

    while sessions.join_next().await.is_some() {}
    Ok(())
}
