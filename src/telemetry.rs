//! Periodic telemetry and GPS trace upload

use crate::bridge::{FlightBridge, FlightState};
use crate::connection::{expect_ok, GroundApi};
use anyhow::Result;
use dronepost_shared::{now_ms, NewCoordinateLog, NewTelemetry, Request};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Samples the bridge on an interval and pushes telemetry plus a GPS log
/// sample for each tick
pub struct TelemetryStreamer {
    device_id: String,
    ground: Arc<dyn GroundApi>,
    bridge: Arc<dyn FlightBridge>,
    every: Duration,
}

impl TelemetryStreamer {
    pub fn new(
        device_id: String,
        ground: Arc<dyn GroundApi>,
        bridge: Arc<dyn FlightBridge>,
        every: Duration,
    ) -> Self {
        Self {
            device_id,
            ground,
            bridge,
            every,
        }
    }

    /// Push one sample
    pub async fn push(&self) -> Result<()> {
        let state = self.bridge.state().await;
        let timestamp = now_ms();

        expect_ok(
            self.ground
                .call(Request::IngestTelemetry(telemetry_from(&self.device_id, &state, timestamp)))
                .await?,
        )?;
        expect_ok(
            self.ground
                .call(Request::AppendLog(log_from(&state, timestamp)))
                .await?,
        )?;
        Ok(())
    }

    /// Stream until shutdown is signalled
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.push().await {
                        warn!(error = %e, "failed to stream telemetry");
                    }
                }
                _ = shutdown.changed() => {
                    debug!("telemetry streamer stopping");
                    return;
                }
            }
        }
    }
}

fn telemetry_from(device_id: &str, state: &FlightState, timestamp: u64) -> NewTelemetry {
    NewTelemetry {
        heading: Some(state.heading),
        ground_speed: Some(state.ground_speed),
        battery_level: Some(state.battery_level),
        flight_mode: Some(state.flight_mode.clone()),
        armed: state.armed,
        timestamp: Some(timestamp),
        ..NewTelemetry::at(device_id, state.latitude, state.longitude, state.altitude)
    }
}

fn log_from(state: &FlightState, timestamp: u64) -> NewCoordinateLog {
    NewCoordinateLog {
        altitude: Some(state.altitude),
        heading: Some(state.heading),
        speed: Some(state.ground_speed),
        ..NewCoordinateLog::at(state.latitude, state.longitude, timestamp)
    }
}
