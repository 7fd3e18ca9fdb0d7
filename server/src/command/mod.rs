//! Command dispatch for polling vehicles
//!
//! This module handles:
//! - Validating and queuing commands per vehicle
//! - Serving the pending queue to polling vehicles in issue order
//! - Guarding status reports with the command state machine

mod queue;

pub use queue::CommandQueue;
