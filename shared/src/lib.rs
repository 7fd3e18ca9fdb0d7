//! DronePost Shared Types
//!
//! This crate provides the domain records, wire protocol and codec used
//! between polling vehicles, operators and the ground service.

pub mod codec;
pub mod command;
pub mod model;
pub mod protocol;
pub mod state_machine;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types at crate root
pub use command::{CommandKind, CommandType, GotoParams, ParamError, TakeoffParams};
pub use model::*;
pub use protocol::{Envelope, ErrorKind, ErrorReply, Header, Payload, Reply, Request, Response};
pub use state_machine::CommandStatus;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Protocol-wide limits and defaults
pub mod limits {
    /// Milliseconds in one hour
    pub const MS_PER_HOUR: u64 = 60 * 60 * 1000;

    /// Milliseconds in one day
    pub const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;

    /// Half-width of the window used to match a trigger to a GPS log sample
    pub const CORRELATION_WINDOW_MS: u64 = 5000;

    /// Command history entries returned when no limit is given
    pub const DEFAULT_HISTORY_LIMIT: usize = 50;

    /// Telemetry samples returned by a listing when no limit is given
    pub const DEFAULT_TELEMETRY_LIST_LIMIT: usize = 100;

    /// Window for telemetry statistics when none is given
    pub const DEFAULT_STATS_WINDOW_HOURS: f64 = 24.0;

    /// Telemetry older than this is purged by the retention sweep
    pub const DEFAULT_RETENTION_DAYS: u32 = 30;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_creation() {
        let header = Header::new("drone_01", 1);
        assert_eq!(header.device_id, "drone_01");
        assert_eq!(header.sequence_id, 1);
        assert!(header.timestamp_ms > 0);
    }

    #[test]
    fn test_response_echoes_sequence() {
        let env = Envelope::response("ground", 42, Response::Ok(Reply::Pong));
        assert_eq!(env.header.sequence_id, 42);
        assert!(matches!(env.payload, Payload::Response(Response::Ok(Reply::Pong))));
    }
}
