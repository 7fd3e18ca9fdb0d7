//! In-process vehicle model used in place of a flight controller

use super::{CommandResult, FlightBridge, FlightState};
use async_trait::async_trait;
use dronepost_shared::{CommandKind, GotoParams, TakeoffParams};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::info;

/// Altitude used by TAKEOFF when none is given
const DEFAULT_TAKEOFF_ALTITUDE_M: f64 = 10.0;

/// Battery drained per telemetry sample while armed
const BATTERY_DRAIN_PER_SAMPLE: f64 = 0.05;

/// Below this battery level TAKEOFF and GOTO are refused
const MIN_FLIGHT_BATTERY: f64 = 20.0;

/// Vehicle that executes commands instantly against an in-memory model
pub struct SimulatedBridge {
    home: (f64, f64),
    state: RwLock<FlightState>,
}

impl SimulatedBridge {
    pub fn new(home_latitude: f64, home_longitude: f64) -> Self {
        Self {
            home: (home_latitude, home_longitude),
            state: RwLock::new(FlightState {
                latitude: home_latitude,
                longitude: home_longitude,
                altitude: 0.0,
                heading: 0.0,
                ground_speed: 0.0,
                battery_level: 100.0,
                armed: false,
                flight_mode: "STABILIZE".into(),
            }),
        }
    }
}

fn failed(message: impl Into<String>) -> CommandResult {
    CommandResult::Failed {
        message: message.into(),
    }
}

fn handle_arm(state: &mut FlightState) -> CommandResult {
    if state.armed {
        return CommandResult::Completed {
            result: json!({"armed": true, "message": "already armed"}),
        };
    }
    state.armed = true;
    CommandResult::Completed {
        result: json!({"armed": true}),
    }
}

fn handle_disarm(state: &mut FlightState) -> CommandResult {
    if state.altitude > 0.0 {
        return failed("cannot disarm while airborne");
    }
    state.armed = false;
    state.flight_mode = "STABILIZE".into();
    CommandResult::Completed {
        result: json!({"armed": false}),
    }
}

fn handle_takeoff(state: &mut FlightState, params: &TakeoffParams) -> CommandResult {
    if !state.armed {
        return failed("vehicle is not armed");
    }
    if state.battery_level < MIN_FLIGHT_BATTERY {
        return failed(format!("battery too low: {:.0}%", state.battery_level));
    }
    let altitude = params.altitude.unwrap_or(DEFAULT_TAKEOFF_ALTITUDE_M);
    if altitude <= 0.0 {
        return failed(format!("invalid takeoff altitude {altitude}"));
    }

    state.altitude = altitude;
    state.flight_mode = "GUIDED".into();
    CommandResult::Completed {
        result: json!({"altitude": altitude}),
    }
}

fn handle_goto(state: &mut FlightState, params: &GotoParams) -> CommandResult {
    if state.altitude <= 0.0 {
        return failed("vehicle is not airborne");
    }
    if state.battery_level < MIN_FLIGHT_BATTERY {
        return failed(format!("battery too low: {:.0}%", state.battery_level));
    }

    state.heading = bearing(state.latitude, state.longitude, params.latitude, params.longitude);
    state.latitude = params.latitude;
    state.longitude = params.longitude;
    if let Some(alt) = params.altitude {
        state.altitude = alt;
    }
    CommandResult::Completed {
        result: json!({
            "reached": true,
            "latitude": state.latitude,
            "longitude": state.longitude,
            "altitude": state.altitude,
        }),
    }
}

fn handle_land(state: &mut FlightState) -> CommandResult {
    state.altitude = 0.0;
    state.ground_speed = 0.0;
    state.flight_mode = "LAND".into();
    CommandResult::Completed {
        result: json!({"landed": true}),
    }
}

fn handle_rtl(state: &mut FlightState, home: (f64, f64)) -> CommandResult {
    if state.altitude <= 0.0 && (state.latitude, state.longitude) == home {
        return CommandResult::Completed {
            result: json!({"home": true, "message": "already home"}),
        };
    }
    state.latitude = home.0;
    state.longitude = home.1;
    state.altitude = 0.0;
    state.ground_speed = 0.0;
    state.flight_mode = "RTL".into();
    CommandResult::Completed {
        result: json!({"home": true}),
    }
}

/// Initial bearing in degrees from one point to another
fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dlon = (lon2 - lon1).to_radians();
    let y = dlon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

#[async_trait]
impl FlightBridge for SimulatedBridge {
    async fn execute(&self, command: &CommandKind) -> CommandResult {
        let mut state = self.state.write().await;
        let result = match command {
            CommandKind::Arm => handle_arm(&mut state),
            CommandKind::Disarm => handle_disarm(&mut state),
            CommandKind::Takeoff(params) => handle_takeoff(&mut state, params),
            CommandKind::Goto(params) => handle_goto(&mut state, params),
            CommandKind::Land => handle_land(&mut state),
            CommandKind::Rtl => handle_rtl(&mut state, self.home),
        };
        info!(command = %command.command_type(), ?result, "[SIM] command executed");
        result
    }

    async fn state(&self) -> FlightState {
        let mut state = self.state.write().await;
        if state.armed {
            state.battery_level = (state.battery_level - BATTERY_DRAIN_PER_SAMPLE).max(0.0);
        }
        state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(result: &CommandResult) -> bool {
        matches!(result, CommandResult::Completed { .. })
    }

    #[tokio::test]
    async fn test_takeoff_requires_arming() {
        let sim = SimulatedBridge::new(37.0, -122.0);
        let takeoff = CommandKind::Takeoff(TakeoffParams { altitude: Some(15.0) });

        assert!(!completed(&sim.execute(&takeoff).await));
        assert!(completed(&sim.execute(&CommandKind::Arm).await));
        assert!(completed(&sim.execute(&takeoff).await));
        assert_eq!(sim.state().await.altitude, 15.0);
    }

    #[tokio::test]
    async fn test_goto_moves_vehicle() {
        let sim = SimulatedBridge::new(37.0, -122.0);
        sim.execute(&CommandKind::Arm).await;
        sim.execute(&CommandKind::Takeoff(TakeoffParams::default())).await;

        let goto = CommandKind::Goto(GotoParams {
            latitude: 37.7749,
            longitude: -122.4194,
            altitude: None,
        });
        let result = sim.execute(&goto).await;
        assert!(matches!(result, CommandResult::Completed { ref result } if result["reached"] == true));

        let state = sim.state().await;
        assert_eq!((state.latitude, state.longitude), (37.7749, -122.4194));
        assert_eq!(state.altitude, DEFAULT_TAKEOFF_ALTITUDE_M);
    }

    #[tokio::test]
    async fn test_disarm_refused_in_flight() {
        let sim = SimulatedBridge::new(0.0, 0.0);
        sim.execute(&CommandKind::Arm).await;
        sim.execute(&CommandKind::Takeoff(TakeoffParams::default())).await;
        assert!(!completed(&sim.execute(&CommandKind::Disarm).await));

        assert!(completed(&sim.execute(&CommandKind::Rtl).await));
        assert!(completed(&sim.execute(&CommandKind::Disarm).await));
        assert!(!sim.state().await.armed);
    }

    #[tokio::test]
    async fn test_battery_drains_only_when_armed() {
        let sim = SimulatedBridge::new(0.0, 0.0);
        assert_eq!(sim.state().await.battery_level, 100.0);
        sim.execute(&CommandKind::Arm).await;
        assert!(sim.state().await.battery_level < 100.0);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        assert!((bearing(0.0, 0.0, 1.0, 0.0) - 0.0).abs() < 1e-6);
        assert!((bearing(0.0, 0.0, 0.0, 1.0) - 90.0).abs() < 1e-6);
        assert!((bearing(0.0, 0.0, -1.0, 0.0) - 180.0).abs() < 1e-6);
    }
}
