//! Record bindings for the four entity types

use super::{Record, StoreError, StoreResult};
use dronepost_shared::{
    Command, CommandKind, CommandStatus, Coordinate, CoordinateLog, RecordId, Telemetry,
};
use std::convert::Infallible;

/// Validated coordinate ready to store
#[derive(Debug, Clone)]
pub struct CoordinateDraft {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    /// Detection time; defaults to the creation time
    pub timestamp: Option<u64>,
}

/// Visited/delivered flags to set; both are written in one update
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinatePatch {
    pub is_visited: Option<bool>,
    pub is_delivered: Option<bool>,
}

impl Record for Coordinate {
    type Draft = CoordinateDraft;
    type Patch = CoordinatePatch;

    const TABLE: &'static str = "coordinates";

    fn id(&self) -> RecordId {
        self.id
    }

    fn build(id: RecordId, created_at: u64, draft: CoordinateDraft) -> Self {
        Self {
            id,
            latitude: draft.latitude,
            longitude: draft.longitude,
            altitude: draft.altitude,
            timestamp: draft.timestamp.unwrap_or(created_at),
            is_visited: false,
            is_delivered: false,
            created_at,
        }
    }

    fn apply(&mut self, patch: CoordinatePatch) -> StoreResult<()> {
        if let Some(visited) = patch.is_visited {
            self.is_visited = visited;
        }
        if let Some(delivered) = patch.is_delivered {
            self.is_delivered = delivered;
        }
        Ok(())
    }
}

/// Validated GPS trace sample
#[derive(Debug, Clone)]
pub struct LogDraft {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub timestamp: u64,
}

impl Record for CoordinateLog {
    type Draft = LogDraft;
    /// The trace is append-only
    type Patch = Infallible;

    const TABLE: &'static str = "coordinate_logs";

    fn id(&self) -> RecordId {
        self.id
    }

    fn build(id: RecordId, _created_at: u64, draft: LogDraft) -> Self {
        Self {
            id,
            latitude: draft.latitude,
            longitude: draft.longitude,
            altitude: draft.altitude,
            heading: draft.heading,
            speed: draft.speed,
            timestamp: draft.timestamp,
        }
    }

    fn apply(&mut self, patch: Infallible) -> StoreResult<()> {
        match patch {}
    }

    fn natural_key(&self) -> Option<String> {
        Some(format!(
            "{}:{:x}:{:x}",
            self.timestamp,
            self.latitude.to_bits(),
            self.longitude.to_bits()
        ))
    }
}

#[derive(Debug, Clone)]
pub struct CommandDraft {
    pub drone_id: String,
    pub command: CommandKind,
}

/// Status change guarded by the status the writer last observed
#[derive(Debug, Clone)]
pub struct CommandPatch {
    pub expected: CommandStatus,
    pub status: CommandStatus,
    pub result: Option<serde_json::Value>,
    pub executed_at: Option<u64>,
}

impl Record for Command {
    type Draft = CommandDraft;
    type Patch = CommandPatch;

    const TABLE: &'static str = "commands";

    fn id(&self) -> RecordId {
        self.id
    }

    fn build(id: RecordId, created_at: u64, draft: CommandDraft) -> Self {
        Self {
            id,
            drone_id: draft.drone_id,
            command: draft.command,
            status: CommandStatus::Pending,
            result: None,
            created_at,
            executed_at: None,
        }
    }

    fn apply(&mut self, patch: CommandPatch) -> StoreResult<()> {
        if self.status != patch.expected {
            return Err(StoreError::Conflict {
                table: Self::TABLE,
                id: self.id,
                reason: format!("expected status {}, found {}", patch.expected, self.status),
            });
        }

        self.status = patch.status;
        if patch.result.is_some() {
            self.result = patch.result;
        }
        if patch.executed_at.is_some() {
            self.executed_at = patch.executed_at;
        }
        Ok(())
    }
}

/// Validated telemetry snapshot
#[derive(Debug, Clone)]
pub struct TelemetryDraft {
    pub drone_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub heading: Option<f64>,
    pub ground_speed: Option<f64>,
    pub vertical_speed: Option<f64>,
    pub battery_level: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub gps_fix_type: Option<u8>,
    pub satellite_count: Option<u32>,
    pub flight_mode: Option<String>,
    pub armed: bool,
    pub timestamp: u64,
}

impl Record for Telemetry {
    type Draft = TelemetryDraft;
    type Patch = Infallible;

    const TABLE: &'static str = "telemetry";

    fn id(&self) -> RecordId {
        self.id
    }

    fn build(id: RecordId, _created_at: u64, d: TelemetryDraft) -> Self {
        Self {
            id,
            drone_id: d.drone_id,
            latitude: d.latitude,
            longitude: d.longitude,
            altitude: d.altitude,
            heading: d.heading,
            ground_speed: d.ground_speed,
            vertical_speed: d.vertical_speed,
            battery_level: d.battery_level,
            voltage: d.voltage,
            current: d.current,
            gps_fix_type: d.gps_fix_type,
            satellite_count: d.satellite_count,
            flight_mode: d.flight_mode,
            armed: d.armed,
            timestamp: d.timestamp,
        }
    }

    fn apply(&mut self, patch: Infallible) -> StoreResult<()> {
        match patch {}
    }
}
