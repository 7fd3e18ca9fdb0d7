//! Command executor - polls the ground queue and reports outcomes

use crate::bridge::{CommandResult, FlightBridge};
use crate::connection::{expect_ok, GroundApi};
use anyhow::{bail, Result};
use dronepost_shared::{Command, CommandStatus, ErrorKind, RecordId, Reply, Request, Response};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Final status and result of a command executed on this vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: CommandStatus,
    pub result: Value,
}

impl From<CommandResult> for Outcome {
    fn from(result: CommandResult) -> Self {
        match result {
            CommandResult::Completed { result } => Outcome {
                status: CommandStatus::Completed,
                result,
            },
            CommandResult::Failed { message } => Outcome {
                status: CommandStatus::Failed,
                result: json!({ "error": message }),
            },
        }
    }
}

/// How a status report was received by the ground service
enum Reported {
    Accepted,
    /// The ground already holds a different terminal status
    Rejected,
}

/// Executes queued commands for one vehicle
///
/// The ground queue gives at-least-once delivery; this side makes the effect
/// exactly-once. A command is claimed before EXECUTING is sent; if that
/// report is lost the claim is resumed on the next poll, since the ground
/// stops listing a command once it is EXECUTING. An outcome whose report did
/// not get through is kept and re-reported instead of the command running again.
pub struct CommandExecutor {
    device_id: String,
    ground: Arc<dyn GroundApi>,
    bridge: Arc<dyn FlightBridge>,
    claimed: Mutex<BTreeMap<RecordId, Command>>,
    unreported: Mutex<BTreeMap<RecordId, Outcome>>,
}

impl CommandExecutor {
    pub fn new(device_id: String, ground: Arc<dyn GroundApi>, bridge: Arc<dyn FlightBridge>) -> Self {
        Self {
            device_id,
            ground,
            bridge,
            claimed: Mutex::new(BTreeMap::new()),
            unreported: Mutex::new(BTreeMap::new()),
        }
    }

    /// Outcomes still waiting to be reported
    pub async fn unreported_count(&self) -> usize {
        self.unreported.lock().await.len()
    }

    /// Commands whose EXECUTING report has not been acknowledged
    pub async fn claimed_count(&self) -> usize {
        self.claimed.lock().await.len()
    }

    /// One poll cycle: flush unreported outcomes, resume claimed commands,
    /// then run pending commands in issue order. Returns how many commands
    /// were executed.
    pub async fn poll_once(&self) -> Result<usize> {
        self.flush_unreported().await;

        let mut executed = 0;
        let resumed: Vec<_> = self.claimed.lock().await.values().cloned().collect();
        for command in resumed {
            debug!(id = command.id, "resuming claimed command");
            if self.execute(command).await? {
                executed += 1;
            }
        }

        let reply = expect_ok(
            self.ground
                .call(Request::PollPending {
                    drone_id: self.device_id.clone(),
                })
                .await?,
        )?;
        let Reply::Commands(pending) = reply else {
            bail!("unexpected reply to poll_pending: {reply:?}");
        };

        if !pending.is_empty() {
            debug!(count = pending.len(), "pending commands received");
        }

        for command in pending {
            if self.is_tracked(command.id).await {
                continue;
            }
            if self.execute(command).await? {
                executed += 1;
            }
        }
        Ok(executed)
    }

    async fn is_tracked(&self, id: RecordId) -> bool {
        self.claimed.lock().await.contains_key(&id) || self.unreported.lock().await.contains_key(&id)
    }

    /// Claim and run one command; `false` if the ground no longer wants it
    ///
    /// A failed EXECUTING report leaves the claim in place for the next poll.
    async fn execute(&self, command: Command) -> Result<bool> {
        info!(
            id = command.id,
            command = %command.command.command_type(),
            "executing command"
        );

        self.claimed.lock().await.insert(command.id, command.clone());
        let reported = self.report(command.id, CommandStatus::Executing, None).await?;
        self.claimed.lock().await.remove(&command.id);

        match reported {
            Reported::Accepted => {}
            Reported::Rejected => {
                // Someone else already finished it
                warn!(id = command.id, "command no longer pending, skipping");
                return Ok(false);
            }
        }

        let outcome = Outcome::from(self.bridge.execute(&command.command).await);
        self.unreported.lock().await.insert(command.id, outcome.clone());

        self.report_outcome(command.id, outcome).await;
        Ok(true)
    }

    async fn flush_unreported(&self) {
        let pending: Vec<_> = self
            .unreported
            .lock()
            .await
            .iter()
            .map(|(id, outcome)| (*id, outcome.clone()))
            .collect();

        for (id, outcome) in pending {
            self.report_outcome(id, outcome).await;
        }
    }

    /// Report a final outcome; kept for retry unless the ground settled it
    async fn report_outcome(&self, id: RecordId, outcome: Outcome) {
        match self.report(id, outcome.status, Some(outcome.result)).await {
            Ok(_) => {
                self.unreported.lock().await.remove(&id);
                info!(id, status = %outcome.status, "outcome reported");
            }
            Err(e) => warn!(id, error = %e, "outcome report failed, will retry"),
        }
    }

    async fn report(&self, id: RecordId, status: CommandStatus, result: Option<Value>) -> Result<Reported> {
        let response = self
            .ground
            .call(Request::UpdateStatus {
                id,
                status: status.as_str().to_string(),
                result,
            })
            .await?;

        match response {
            Response::Ok(_) => Ok(Reported::Accepted),
            Response::Err(e) if matches!(e.kind, ErrorKind::InvalidTransition | ErrorKind::NotFound) => {
                debug!(id, %status, reason = %e.message, "status report not applied");
                Ok(Reported::Rejected)
            }
            Response::Err(e) => bail!("{}: {}", e.kind, e.message),
        }
    }
}
