//! Request dispatch for the ground service
//!
//! [`GroundStation`] owns one instance of each core component, all sharing
//! the same [`Store`], and maps every wire [`Request`] to the matching
//! operation. Errors become typed [`Response::Err`] bodies; nothing here
//! panics on bad input.

use crate::command::CommandQueue;
use crate::config::QueryConfig;
use crate::coordinates::CoordinateLifecycle;
use crate::correlation::LogCorrelator;
use crate::error::{CoreError, CoreResult};
use crate::logs::LogTrace;
use crate::store::Store;
use crate::telemetry::TelemetryAggregator;
use dronepost_shared::{limits, Reply, Request, Response};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct GroundStation {
    pub coordinates: CoordinateLifecycle,
    pub logs: LogTrace,
    pub correlator: LogCorrelator,
    pub commands: CommandQueue,
    pub telemetry: TelemetryAggregator,
    retention_days: u32,
}

impl GroundStation {
    pub fn new(store: Store, queries: &QueryConfig) -> Self {
        Self {
            coordinates: CoordinateLifecycle::new(store.coordinates.clone()),
            logs: LogTrace::new(store.logs.clone()),
            correlator: LogCorrelator::new(store.logs.clone(), store.coordinates.clone())
                .with_window(queries.correlation_window_ms),
            commands: CommandQueue::new(store.commands.clone())
                .with_history_limit(queries.history_limit),
            telemetry: TelemetryAggregator::new(store.telemetry)
                .with_list_limit(queries.telemetry_list_limit)
                .with_stats_window(queries.stats_window_hours),
            retention_days: limits::DEFAULT_RETENTION_DAYS,
        }
    }

    /// Default age used by `purge_telemetry` when the request gives none
    pub fn with_retention_days(mut self, days: u32) -> Self {
        if days > 0 {
            self.retention_days = days;
        }
        self
    }

    /// Ephemeral station with default settings
    pub fn in_memory() -> Self {
        Self::new(Store::in_memory(), &QueryConfig::default())
    }

    /// Execute one request
    pub async fn handle(&self, request: Request) -> Response {
        let op = request.name();
        match self.dispatch(request).await {
            Ok(reply) => Response::Ok(reply),
            Err(e) => {
                match &e {
                    CoreError::Storage(inner) => warn!(op, error = %inner, "storage failure"),
                    other => debug!(op, error = %other, "request rejected"),
                }
                Response::error(e.kind(), e.to_string())
            }
        }
    }

    async fn dispatch(&self, request: Request) -> CoreResult<Reply> {
        let reply = match request {
            Request::Ping => Reply::Pong,

            // Coordinates
            Request::RecordCoordinate(input) => Reply::Coordinate(self.coordinates.record(input).await?),
            Request::GetCoordinate { id } => Reply::Coordinate(self.coordinates.get(id).await?),
            Request::ListCoordinates {
                is_visited,
                is_delivered,
            } => Reply::Coordinates(self.coordinates.list(is_visited, is_delivered).await?),
            Request::MarkVisited { id } => Reply::Coordinate(self.coordinates.mark_visited(id).await?),
            Request::MarkDelivered { id } => {
                Reply::Coordinate(self.coordinates.mark_delivered(id).await?)
            }
            Request::ListUnvisited => Reply::Coordinates(self.coordinates.list_unvisited().await?),
            Request::ListPending => Reply::Coordinates(self.coordinates.list_pending().await?),
            Request::DeleteCoordinate { id } => Reply::Coordinate(self.coordinates.delete(id).await?),

            // GPS trace
            Request::AppendLog(input) => Reply::Log(self.logs.append(input).await?),
            Request::AppendLogBatch { logs } => Reply::Count {
                count: self.logs.append_batch(logs).await?,
            },
            Request::ListLogs { limit, offset } => {
                let page = self.logs.list(limit, offset).await?;
                Reply::LogPage {
                    logs: page.logs,
                    total: page.total,
                }
            }
            Request::LogRange { start, end } => Reply::Logs(self.logs.range(start, end).await?),
            Request::LatestLog => Reply::Log(self.logs.latest().await?),
            Request::GetLog { id } => Reply::Log(self.logs.get(id).await?),
            Request::DeleteLog { id } => Reply::Log(self.logs.delete(id).await?),
            Request::ClearLogs => Reply::Count {
                count: self.logs.clear().await?,
            },
            Request::LogSummary => Reply::LogSummary(self.logs.summary().await?),
            Request::Correlate { trigger_timestamp } => {
                Reply::Correlation(self.correlator.correlate(trigger_timestamp).await?)
            }

            // Commands
            Request::Enqueue(input) => Reply::Command(self.commands.enqueue(input).await?),
            Request::PollPending { drone_id } => {
                Reply::Commands(self.commands.poll_pending(&drone_id).await?)
            }
            Request::UpdateStatus { id, status, result } => {
                Reply::Command(self.commands.update_status(id, &status, result).await?)
            }
            Request::History {
                drone_id,
                status,
                limit,
            } => Reply::Commands(
                self.commands
                    .history(&drone_id, status.as_deref(), limit)
                    .await?,
            ),
            Request::GetCommand { id } => Reply::Command(self.commands.get(id).await?),
            Request::DeleteCommand { id } => Reply::Command(self.commands.delete(id).await?),

            // Telemetry
            Request::IngestTelemetry(input) => Reply::Telemetry(self.telemetry.ingest(input).await?),
            Request::LatestTelemetry { drone_id } => {
                Reply::Telemetry(self.telemetry.latest(&drone_id).await?)
            }
            Request::TelemetryStats { drone_id, hours } => {
                Reply::TelemetryStats(self.telemetry.stats(&drone_id, hours).await?)
            }
            Request::ListTelemetry {
                drone_id,
                since,
                until,
                limit,
            } => Reply::TelemetrySeries(self.telemetry.list(drone_id, since, until, limit).await?),
            Request::GetTelemetry { id } => Reply::Telemetry(self.telemetry.get(id).await?),
            Request::PurgeTelemetry { days } => Reply::Count {
                count: self
                    .telemetry
                    .purge_older_than(days.unwrap_or(self.retention_days))
                    .await?,
            },
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dronepost_shared::{ErrorKind, NewCoordinate, NewCoordinateLog};

    fn kind(resp: &Response) -> Option<ErrorKind> {
        match resp {
            Response::Err(e) => Some(e.kind),
            Response::Ok(_) => None,
        }
    }

    #[tokio::test]
    async fn test_ping() {
        let station = GroundStation::in_memory();
        assert_eq!(station.handle(Request::Ping).await, Response::Ok(Reply::Pong));
    }

    #[tokio::test]
    async fn test_errors_are_typed() {
        let station = GroundStation::in_memory();

        let resp = station.handle(Request::GetCoordinate { id: 1 }).await;
        assert_eq!(kind(&resp), Some(ErrorKind::NotFound));

        let resp = station
            .handle(Request::RecordCoordinate(NewCoordinate::default()))
            .await;
        assert_eq!(kind(&resp), Some(ErrorKind::Validation));

        let resp = station
            .handle(Request::Correlate {
                trigger_timestamp: 1_000_000,
            })
            .await;
        assert_eq!(kind(&resp), Some(ErrorKind::NoMatchingLog));
    }

    #[tokio::test]
    async fn test_batch_reports_count() {
        let station = GroundStation::in_memory();
        let resp = station
            .handle(Request::AppendLogBatch {
                logs: vec![
                    NewCoordinateLog::at(1.0, 1.0, 100),
                    NewCoordinateLog::at(1.0, 1.0, 200),
                ],
            })
            .await;
        assert_eq!(resp, Response::Ok(Reply::Count { count: 2 }));
    }

    #[tokio::test]
    async fn test_purge_uses_default_retention() {
        let station = GroundStation::in_memory().with_retention_days(7);
        let resp = station.handle(Request::PurgeTelemetry { days: None }).await;
        assert_eq!(resp, Response::Ok(Reply::Count { count: 0 }));

        let resp = station.handle(Request::PurgeTelemetry { days: Some(0) }).await;
        assert_eq!(kind(&resp), Some(ErrorKind::Validation));
    }
}
