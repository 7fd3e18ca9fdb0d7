//! Command execution on the vehicle side
//!
//! This module handles:
//! - Polling the ground queue for pending commands
//! - Handing each command to the flight bridge
//! - Reporting EXECUTING, then COMPLETED or FAILED with the result
//! - Re-reporting outcomes whose report was lost

mod executor;

pub use executor::CommandExecutor;
