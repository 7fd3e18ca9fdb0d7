//! Domain records stored by the ground service
//!
//! Records are what the storage layer persists and what responses carry.
//! The `New*` inputs are what callers submit; their required fields are
//! `Option`s so that a missing value surfaces as a validation error instead
//! of a decode failure.

use serde::{Deserialize, Serialize};

use crate::command::CommandKind;
use crate::state_machine::CommandStatus;

/// Storage-assigned record identifier
pub type RecordId = u64;

/// A detected target the fleet should visit and deliver to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    pub id: RecordId,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    pub timestamp: u64,
    pub is_visited: bool,
    pub is_delivered: bool,
    pub created_at: u64,
}

impl Coordinate {
    /// A delivered coordinate must also be visited
    pub fn is_consistent(&self) -> bool {
        !self.is_delivered || self.is_visited
    }
}

/// One sample of the raw GPS trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinateLog {
    pub id: RecordId,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    pub timestamp: u64,
}

/// A control command queued for a polling vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: RecordId,
    pub drone_id: String,
    pub command: CommandKind,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<u64>,
}

/// A periodic vehicle state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    pub id: RecordId,
    pub drone_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_fix_type: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellite_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_mode: Option<String>,
    pub armed: bool,
    pub timestamp: u64,
}

/// Rolling statistics over one vehicle's telemetry window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryStats {
    pub drone_id: String,
    pub window_hours: f64,
    pub data_points: usize,
    pub average_battery_level: Option<f64>,
    pub average_altitude: f64,
    pub average_ground_speed: Option<f64>,
    pub max_altitude: f64,
    pub min_battery_level: Option<f64>,
    pub first_data_point: u64,
    pub last_data_point: u64,
}

/// Outcome of promoting a GPS log sample into a coordinate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlation {
    pub coordinate: Coordinate,
    pub source_log_id: RecordId,
}

/// Overview of the stored GPS trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSummary {
    pub total_logs: usize,
    pub oldest_log: Option<u64>,
    pub newest_log: Option<u64>,
}

/// Input for recording a detected coordinate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCoordinate {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl NewCoordinate {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..Default::default()
        }
    }
}

/// Input for one GPS trace sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCoordinateLog {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl NewCoordinateLog {
    pub fn at(latitude: f64, longitude: f64, timestamp: u64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            timestamp: Some(timestamp),
            ..Default::default()
        }
    }
}

/// Input for a command issued by the control plane
///
/// `command` and `parameters` stay loosely typed here and are validated
/// into a [`CommandKind`] by the dispatch queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommand {
    #[serde(default)]
    pub drone_id: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

/// Input for a telemetry snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTelemetry {
    #[serde(default)]
    pub drone_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub ground_speed: Option<f64>,
    #[serde(default)]
    pub vertical_speed: Option<f64>,
    #[serde(default)]
    pub battery_level: Option<f64>,
    #[serde(default)]
    pub voltage: Option<f64>,
    #[serde(default)]
    pub current: Option<f64>,
    #[serde(default)]
    pub gps_fix_type: Option<u8>,
    #[serde(default)]
    pub satellite_count: Option<u32>,
    #[serde(default)]
    pub flight_mode: Option<String>,
    #[serde(default)]
    pub armed: bool,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl NewTelemetry {
    pub fn at(drone_id: impl Into<String>, latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            drone_id: drone_id.into(),
            latitude: Some(latitude),
            longitude: Some(longitude),
            altitude: Some(altitude),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_consistency() {
        let mut coord = Coordinate {
            id: 1,
            latitude: 37.0,
            longitude: -122.0,
            altitude: None,
            timestamp: 0,
            is_visited: false,
            is_delivered: false,
            created_at: 0,
        };
        assert!(coord.is_consistent());

        coord.is_delivered = true;
        assert!(!coord.is_consistent());

        coord.is_visited = true;
        assert!(coord.is_consistent());
    }

    #[test]
    fn test_missing_latitude_decodes_as_none() {
        let input: NewCoordinate = serde_json::from_str(r#"{"longitude": -122.4}"#).unwrap();
        assert!(input.latitude.is_none());
        assert_eq!(input.longitude, Some(-122.4));
    }

    #[test]
    fn test_telemetry_optional_fields_omitted() {
        let input: NewTelemetry = serde_json::from_str(
            r#"{"droneId": "drone_01", "latitude": 1.0, "longitude": 2.0, "altitude": 3.0}"#,
        )
        .unwrap();
        assert_eq!(input.drone_id, "drone_01");
        assert!(input.battery_level.is_none());
        assert!(!input.armed);
    }
}
