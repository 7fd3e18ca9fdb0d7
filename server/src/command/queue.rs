//! Pull-based command queue for intermittently connected vehicles

use crate::error::{CoreError, CoreResult};
use crate::store::{CommandDraft, CommandPatch, Direction, Query, Table};
use crate::validate;
use dronepost_shared::state_machine::{check_transition, TransitionResult, UnknownStatus};
use dronepost_shared::{
    limits, now_ms, Command, CommandKind, CommandStatus, NewCommand, RecordId,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Command queue shared by the control plane and polling vehicles
///
/// A command is never consumed by reading it: `poll_pending` returns every
/// PENDING command until the vehicle reports a new status, so a vehicle that
/// restarts re-observes its unfinished work.
#[derive(Clone)]
pub struct CommandQueue {
    commands: Arc<dyn Table<Command>>,
    history_limit: usize,
}

impl CommandQueue {
    pub fn new(commands: Arc<dyn Table<Command>>) -> Self {
        Self {
            commands,
            history_limit: limits::DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Default number of entries returned by `history`
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub async fn enqueue(&self, input: NewCommand) -> CoreResult<Command> {
        let drone_id = validate::drone_id(&input.drone_id)?;
        let command = CommandKind::parse(&input.command, input.parameters.as_ref())?;

        let cmd = self
            .commands
            .create(CommandDraft { drone_id, command })
            .await?;

        info!(
            id = cmd.id,
            drone_id = %cmd.drone_id,
            command = %cmd.command.command_type(),
            "command queued"
        );
        Ok(cmd)
    }

    /// Every PENDING command for the vehicle, in issue order
    pub async fn poll_pending(&self, drone_id: &str) -> CoreResult<Vec<Command>> {
        let drone = drone_id.to_string();
        let query = Query::all()
            .filter(move |c: &Command| c.drone_id == drone && c.status == CommandStatus::Pending)
            .order_by(|c| c.created_at, Direction::Asc);

        let pending = self.commands.find_many(query).await?;
        debug!(drone_id, count = pending.len(), "pending commands polled");
        Ok(pending)
    }

    /// Move a command to `status`
    ///
    /// Re-reporting the terminal status a command already has returns it
    /// unchanged. The write is conditional on the status read here, so two
    /// racing reporters cannot both succeed.
    pub async fn update_status(
        &self,
        id: RecordId,
        status: &str,
        result: Option<Value>,
    ) -> CoreResult<Command> {
        let to: CommandStatus = status
            .parse()
            .map_err(|e: UnknownStatus| CoreError::validation(e.to_string()))?;

        let current = self.get(id).await?;

        let to = match check_transition(current.status, to) {
            TransitionResult::Apply(to) => to,
            TransitionResult::Replay(status) => {
                debug!(id, %status, "terminal status re-reported");
                return Ok(current);
            }
            TransitionResult::Invalid { from, to } => {
                debug!(id, %from, %to, "status transition rejected");
                return Err(CoreError::InvalidTransition { from, to });
            }
        };

        let patch = CommandPatch {
            expected: current.status,
            status: to,
            result,
            executed_at: to.is_terminal().then(now_ms),
        };
        let updated = self.commands.update(id, patch).await?;

        info!(
            id,
            drone_id = %updated.drone_id,
            from = %current.status,
            to = %updated.status,
            "command status updated"
        );
        Ok(updated)
    }

    /// Audit trail for one vehicle, newest first
    pub async fn history(
        &self,
        drone_id: &str,
        status: Option<&str>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Command>> {
        let status: Option<CommandStatus> = status
            .map(str::parse)
            .transpose()
            .map_err(|e: UnknownStatus| CoreError::validation(e.to_string()))?;

        let limit = limit.unwrap_or(self.history_limit);
        if limit == 0 {
            return Err(CoreError::validation("limit must be positive"));
        }

        let drone = drone_id.to_string();
        let query = Query::all()
            .filter(move |c: &Command| {
                c.drone_id == drone && status.map_or(true, |s| c.status == s)
            })
            .order_by(|c| c.created_at, Direction::Desc)
            .limit(limit);
        Ok(self.commands.find_many(query).await?)
    }

    pub async fn get(&self, id: RecordId) -> CoreResult<Command> {
        self.commands
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("command {id}")))
    }

    pub async fn delete(&self, id: RecordId) -> CoreResult<Command> {
        let cmd = self.commands.delete(id).await?;
        info!(id, drone_id = %cmd.drone_id, "command deleted");
        Ok(cmd)
    }
}
