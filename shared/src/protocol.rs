//! Request/response envelope spoken between vehicles, operators and the
//! ground service

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::*;
use crate::now_ms;

/// Frame header carried by every envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub device_id: String,
    pub sequence_id: u64,
    pub timestamp_ms: u64,
}

/// Top-level message on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub header: Header,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Request(Request),
    Response(Response),
}

/// One operation against the ground service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Ping,

    // Coordinates
    RecordCoordinate(NewCoordinate),
    GetCoordinate { id: RecordId },
    ListCoordinates {
        #[serde(default)]
        is_visited: Option<bool>,
        #[serde(default)]
        is_delivered: Option<bool>,
    },
    MarkVisited { id: RecordId },
    MarkDelivered { id: RecordId },
    ListUnvisited,
    ListPending,
    DeleteCoordinate { id: RecordId },

    // GPS trace
    AppendLog(NewCoordinateLog),
    AppendLogBatch { logs: Vec<NewCoordinateLog> },
    ListLogs {
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        offset: Option<usize>,
    },
    LogRange { start: u64, end: u64 },
    LatestLog,
    GetLog { id: RecordId },
    DeleteLog { id: RecordId },
    ClearLogs,
    LogSummary,
    Correlate { trigger_timestamp: u64 },

    // Commands
    Enqueue(NewCommand),
    PollPending { drone_id: String },
    UpdateStatus {
        id: RecordId,
        status: String,
        #[serde(default)]
        result: Option<serde_json::Value>,
    },
    History {
        drone_id: String,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        limit: Option<usize>,
    },
    GetCommand { id: RecordId },
    DeleteCommand { id: RecordId },

    // Telemetry
    IngestTelemetry(NewTelemetry),
    LatestTelemetry { drone_id: String },
    TelemetryStats {
        drone_id: String,
        #[serde(default)]
        hours: Option<f64>,
    },
    ListTelemetry {
        #[serde(default)]
        drone_id: Option<String>,
        #[serde(default)]
        since: Option<u64>,
        #[serde(default)]
        until: Option<u64>,
        #[serde(default)]
        limit: Option<usize>,
    },
    GetTelemetry { id: RecordId },
    PurgeTelemetry {
        #[serde(default)]
        days: Option<u32>,
    },
}

impl Request {
    /// Short operation name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::RecordCoordinate(_) => "record_coordinate",
            Request::GetCoordinate { .. } => "get_coordinate",
            Request::ListCoordinates { .. } => "list_coordinates",
            Request::MarkVisited { .. } => "mark_visited",
            Request::MarkDelivered { .. } => "mark_delivered",
            Request::ListUnvisited => "list_unvisited",
            Request::ListPending => "list_pending",
            Request::DeleteCoordinate { .. } => "delete_coordinate",
            Request::AppendLog(_) => "append_log",
            Request::AppendLogBatch { .. } => "append_log_batch",
            Request::ListLogs { .. } => "list_logs",
            Request::LogRange { .. } => "log_range",
            Request::LatestLog => "latest_log",
            Request::GetLog { .. } => "get_log",
            Request::DeleteLog { .. } => "delete_log",
            Request::ClearLogs => "clear_logs",
            Request::LogSummary => "log_summary",
            Request::Correlate { .. } => "correlate",
            Request::Enqueue(_) => "enqueue",
            Request::PollPending { .. } => "poll_pending",
            Request::UpdateStatus { .. } => "update_status",
            Request::History { .. } => "history",
            Request::GetCommand { .. } => "get_command",
            Request::DeleteCommand { .. } => "delete_command",
            Request::IngestTelemetry(_) => "ingest_telemetry",
            Request::LatestTelemetry { .. } => "latest_telemetry",
            Request::TelemetryStats { .. } => "telemetry_stats",
            Request::ListTelemetry { .. } => "list_telemetry",
            Request::GetTelemetry { .. } => "get_telemetry",
            Request::PurgeTelemetry { .. } => "purge_telemetry",
        }
    }
}

/// Successful result bodies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Reply {
    Pong,
    Coordinate(Coordinate),
    Coordinates(Vec<Coordinate>),
    Log(CoordinateLog),
    Logs(Vec<CoordinateLog>),
    LogPage { logs: Vec<CoordinateLog>, total: usize },
    LogSummary(LogSummary),
    Correlation(Correlation),
    Command(Command),
    Commands(Vec<Command>),
    Telemetry(Telemetry),
    TelemetrySeries(Vec<Telemetry>),
    TelemetryStats(TelemetryStats),
    Count { count: usize },
}

/// Error categories reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    NoMatchingLog,
    InvalidTransition,
    Storage,
    Protocol,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NoMatchingLog => "no_matching_log",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Storage => "storage",
            ErrorKind::Protocol => "protocol",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Ok(Reply),
    Err(ErrorReply),
}

impl Response {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Err(ErrorReply {
            kind,
            message: message.into(),
        })
    }
}

impl Header {
    /// Create a new header stamped with the current time
    pub fn new(device_id: impl Into<String>, sequence_id: u64) -> Self {
        Self {
            device_id: device_id.into(),
            sequence_id,
            timestamp_ms: now_ms(),
        }
    }
}

impl Envelope {
    pub fn request(device_id: impl Into<String>, sequence_id: u64, request: Request) -> Self {
        Self {
            header: Header::new(device_id, sequence_id),
            payload: Payload::Request(request),
        }
    }

    /// Build a response addressed with the sequence id of the request it answers
    pub fn response(device_id: impl Into<String>, sequence_id: u64, response: Response) -> Self {
        Self {
            header: Header::new(device_id, sequence_id),
            payload: Payload::Response(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let req = Request::PollPending {
            drone_id: "drone_01".into(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["op"], "poll_pending");
        assert_eq!(value["drone_id"], "drone_01");
    }

    #[test]
    fn test_unit_request_decodes() {
        let req: Request = serde_json::from_str(r#"{"op": "list_unvisited"}"#).unwrap();
        assert_eq!(req, Request::ListUnvisited);
    }

    #[test]
    fn test_record_coordinate_from_json() {
        let req: Request =
            serde_json::from_str(r#"{"op": "record_coordinate", "latitude": 37.0, "longitude": -122.0}"#)
                .unwrap();
        assert_eq!(req, Request::RecordCoordinate(NewCoordinate::at(37.0, -122.0)));
    }

    #[test]
    fn test_error_response_shape() {
        let resp = Response::error(ErrorKind::NotFound, "Command 7 not found");
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["err"]["kind"], "not_found");
    }
}
