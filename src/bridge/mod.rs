//! Bridge between queued commands and the vehicle
//!
//! The agent never talks to an autopilot directly; it hands each command to
//! a [`FlightBridge`] and reports whatever the bridge returns. The only
//! bridge shipped here is [`SimulatedBridge`], which models just enough
//! state (armed, airborne, position, battery) to exercise the queue.

mod simulator;

pub use simulator::SimulatedBridge;

use async_trait::async_trait;
use dronepost_shared::CommandKind;
use serde_json::Value;

/// Result of executing one command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Command completed; the value is reported as the command result
    Completed { result: Value },
    /// Command could not be carried out in the current state
    Failed { message: String },
}

/// Vehicle state sampled for telemetry
#[derive(Debug, Clone, PartialEq)]
pub struct FlightState {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub heading: f64,
    pub ground_speed: f64,
    pub battery_level: f64,
    pub armed: bool,
    pub flight_mode: String,
}

#[async_trait]
pub trait FlightBridge: Send + Sync {
    async fn execute(&self, command: &CommandKind) -> CommandResult;

    async fn state(&self) -> FlightState;
}
