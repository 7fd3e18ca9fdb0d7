//! DronePost ground service
//!
//! Ground-side coordination state for a fleet of polling vehicles:
//! - [`coordinates`]: detected targets and their visited/delivered lifecycle
//! - [`logs`] and [`correlation`]: the raw GPS trace and trigger matching
//! - [`command`]: the pull-based command queue
//! - [`telemetry`]: snapshot ingestion and windowed statistics
//!
//! Every component talks to storage only through [`store::Table`];
//! [`station::GroundStation`] binds them to the wire protocol.

pub mod command;
pub mod config;
pub mod coordinates;
pub mod correlation;
pub mod error;
pub mod logs;
pub mod retention;
pub mod session;
pub mod station;
pub mod store;
pub mod telemetry;
mod validate;

pub use config::ServerConfig;
pub use error::{CoreError, CoreResult};
pub use station::GroundStation;
pub use store::Store;
