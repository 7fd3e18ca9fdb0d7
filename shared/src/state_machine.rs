//! Command Status State Machine
//!
//! Defines the lifecycle a queued command goes through between the ground
//! service and the vehicle that polls it:
//!
//! ```text
//! PENDING ──> EXECUTING ──> COMPLETED | FAILED
//!    └──────────────────────> COMPLETED | FAILED
//! ```
//!
//! Terminal states never change again. Re-reporting the same terminal state
//! is accepted as a replay so that a vehicle retrying a lost status report
//! does not see an error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandStatus {
    /// Queued, waiting for the vehicle to pick it up
    Pending,
    /// Vehicle reported it has started executing
    Executing,
    /// Vehicle finished successfully
    Completed,
    /// Vehicle gave up or execution failed
    Failed,
}

impl CommandStatus {
    pub const ALL: [CommandStatus; 4] = [
        CommandStatus::Pending,
        CommandStatus::Executing,
        CommandStatus::Completed,
        CommandStatus::Failed,
    ];

    /// COMPLETED and FAILED are terminal
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Pending => "PENDING",
            CommandStatus::Executing => "EXECUTING",
            CommandStatus::Completed => "COMPLETED",
            CommandStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid status '{0}' (expected one of PENDING, EXECUTING, COMPLETED, FAILED)")]
pub struct UnknownStatus(pub String);

impl FromStr for CommandStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        CommandStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == upper)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Result of checking a requested status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition is allowed and should be written
    Apply(CommandStatus),
    /// Terminal status re-reported; the stored record stays as it is
    Replay(CommandStatus),
    /// Transition is not allowed from the current status
    Invalid {
        from: CommandStatus,
        to: CommandStatus,
    },
}

/// Decide what a requested status change does
pub fn check_transition(from: CommandStatus, to: CommandStatus) -> TransitionResult {
    if from.is_terminal() && from == to {
        return TransitionResult::Replay(from);
    }

    if is_valid_transition(from, to) {
        TransitionResult::Apply(to)
    } else {
        TransitionResult::Invalid { from, to }
    }
}

/// Check if a transition from one status to another may be written
pub fn is_valid_transition(from: CommandStatus, to: CommandStatus) -> bool {
    use CommandStatus::*;

    match (from, to) {
        // Nothing leaves a terminal state
        (Completed | Failed, _) => false,

        // Re-polled and refreshed
        (Pending, Pending) => true,
        (Executing, Executing) => true,

        (Pending, Executing) => true,
        (Pending, Completed | Failed) => true,
        (Executing, Completed | Failed) => true,

        // Never moves backwards
        (Executing, Pending) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CommandStatus::*;

    #[test]
    fn test_normal_lifecycle() {
        assert_eq!(check_transition(Pending, Executing), TransitionResult::Apply(Executing));
        assert_eq!(check_transition(Executing, Completed), TransitionResult::Apply(Completed));
    }

    #[test]
    fn test_direct_completion_from_pending() {
        assert!(is_valid_transition(Pending, Completed));
        assert!(is_valid_transition(Pending, Failed));
    }

    #[test]
    fn test_pending_refresh_is_allowed() {
        assert_eq!(check_transition(Pending, Pending), TransitionResult::Apply(Pending));
    }

    #[test]
    fn test_no_transition_leaves_terminal_state() {
        for from in [Completed, Failed] {
            for to in CommandStatus::ALL {
                assert!(!is_valid_transition(from, to), "{from} -> {to}");
            }
        }
        assert_eq!(
            check_transition(Completed, Failed),
            TransitionResult::Invalid { from: Completed, to: Failed }
        );
    }

    #[test]
    fn test_terminal_replay() {
        assert_eq!(check_transition(Completed, Completed), TransitionResult::Replay(Completed));
        assert_eq!(check_transition(Failed, Failed), TransitionResult::Replay(Failed));
    }

    #[test]
    fn test_executing_cannot_return_to_pending() {
        assert!(matches!(
            check_transition(Executing, Pending),
            TransitionResult::Invalid { .. }
        ));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("completed".parse::<CommandStatus>().unwrap(), Completed);
        assert_eq!("EXECUTING".parse::<CommandStatus>().unwrap(), Executing);
        assert!("DONE".parse::<CommandStatus>().is_err());
    }
}
