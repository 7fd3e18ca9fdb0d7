//! Poll agent configuration

use std::time::Duration;

/// Configuration for the vehicle-side agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Vehicle id; commands are polled for this id
    pub device_id: String,
    /// Ground service address
    pub server: String,
    /// How often pending commands are polled
    pub poll_interval: Duration,
    /// How often telemetry and a GPS log sample are pushed
    pub telemetry_interval: Duration,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Time allowed for one request/response exchange
    pub request_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device_id: "drone_01".into(),
            server: "127.0.0.1:8080".into(),
            poll_interval: Duration::from_secs(2),
            telemetry_interval: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}
