//! Raw GPS trace
//!
//! Append-only log of position samples streamed by vehicles. The trace is
//! independent of the coordinate list; [`crate::correlation`] promotes
//! individual samples into coordinates.

use crate::error::{CoreError, CoreResult};
use crate::store::{Direction, LogDraft, Query, Table};
use crate::validate;
use dronepost_shared::{now_ms, CoordinateLog, LogSummary, NewCoordinateLog, RecordId};
use std::sync::Arc;
use tracing::{debug, info};

/// One page of the trace plus the size of the whole trace
#[derive(Debug, Clone, PartialEq)]
pub struct LogPage {
    pub logs: Vec<CoordinateLog>,
    pub total: usize,
}

#[derive(Clone)]
pub struct LogTrace {
    logs: Arc<dyn Table<CoordinateLog>>,
}

fn draft(input: NewCoordinateLog, received_at: u64) -> CoreResult<LogDraft> {
    let (latitude, longitude) = validate::position(input.latitude, input.longitude)?;
    Ok(LogDraft {
        latitude,
        longitude,
        altitude: validate::optional_number("altitude", input.altitude)?,
        heading: validate::optional_number("heading", input.heading)?,
        speed: validate::optional_number("speed", input.speed)?,
        timestamp: input.timestamp.unwrap_or(received_at),
    })
}

fn by_timestamp(log: &CoordinateLog) -> u64 {
    log.timestamp
}

impl LogTrace {
    pub fn new(logs: Arc<dyn Table<CoordinateLog>>) -> Self {
        Self { logs }
    }

    pub async fn append(&self, input: NewCoordinateLog) -> CoreResult<CoordinateLog> {
        let log = self.logs.create(draft(input, now_ms())?).await?;
        debug!(id = log.id, timestamp = log.timestamp, "log sample appended");
        Ok(log)
    }

    /// Validate every entry, then store the batch skipping duplicates.
    /// Returns how many samples were actually inserted.
    ///
    /// Every entry must carry its own timestamp; a sample is a duplicate when
    /// timestamp and position both match.
    pub async fn append_batch(&self, inputs: Vec<NewCoordinateLog>) -> CoreResult<usize> {
        if inputs.is_empty() {
            return Err(CoreError::validation("logs must not be empty"));
        }

        let drafts = inputs
            .into_iter()
            .enumerate()
            .map(|(i, input)| {
                let timestamp = input
                    .timestamp
                    .ok_or_else(|| CoreError::validation("timestamp is required"));
                timestamp.and_then(|ts| draft(input, ts)).map_err(|e| match e {
                    CoreError::Validation(msg) => CoreError::Validation(format!("logs[{i}]: {msg}")),
                    other => other,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        let submitted = drafts.len();
        let inserted = self.logs.create_many(drafts).await?;
        info!(submitted, inserted, "log batch stored");
        Ok(inserted)
    }

    /// Newest first, with the total trace size
    pub async fn list(&self, limit: Option<usize>, offset: Option<usize>) -> CoreResult<LogPage> {
        let mut query = Query::all().order_by(by_timestamp, Direction::Desc);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        if let Some(offset) = offset {
            query = query.offset(offset);
        }

        let logs = self.logs.find_many(query).await?;
        let total = self.logs.count(None).await?;
        Ok(LogPage { logs, total })
    }

    /// Samples with `start <= timestamp <= end`, oldest first
    pub async fn range(&self, start: u64, end: u64) -> CoreResult<Vec<CoordinateLog>> {
        if start > end {
            return Err(CoreError::validation(format!(
                "range start {start} is after end {end}"
            )));
        }

        let query = Query::all()
            .filter(move |l: &CoordinateLog| (start..=end).contains(&l.timestamp))
            .order_by(by_timestamp, Direction::Asc);
        Ok(self.logs.find_many(query).await?)
    }

    pub async fn latest(&self) -> CoreResult<CoordinateLog> {
        let query = Query::all().order_by(by_timestamp, Direction::Desc).limit(1);
        self.logs
            .find_many(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::NotFound("coordinate logs".into()))
    }

    pub async fn get(&self, id: RecordId) -> CoreResult<CoordinateLog> {
        self.logs
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("coordinate log {id}")))
    }

    pub async fn delete(&self, id: RecordId) -> CoreResult<CoordinateLog> {
        Ok(self.logs.delete(id).await?)
    }

    /// Drop the whole trace
    pub async fn clear(&self) -> CoreResult<usize> {
        let removed = self.logs.delete_many(Arc::new(|_: &CoordinateLog| true)).await?;
        info!(removed, "log trace cleared");
        Ok(removed)
    }

    pub async fn summary(&self) -> CoreResult<LogSummary> {
        let oldest = Query::all().order_by(by_timestamp, Direction::Asc).limit(1);
        let newest = Query::all().order_by(by_timestamp, Direction::Desc).limit(1);

        Ok(LogSummary {
            total_logs: self.logs.count(None).await?,
            oldest_log: self.logs.find_many(oldest).await?.first().map(by_timestamp),
            newest_log: self.logs.find_many(newest).await?.first().map(by_timestamp),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn trace() -> LogTrace {
        LogTrace::new(Store::in_memory().logs)
    }

    async fn seeded(stamps: &[u64]) -> LogTrace {
        let t = trace();
        for &ts in stamps {
            t.append(NewCoordinateLog::at(37.0, -122.0 + ts as f64 * 1e-6, ts))
                .await
                .unwrap();
        }
        t
    }

    #[tokio::test]
    async fn test_append_defaults_timestamp() {
        let t = trace();
        let before = now_ms();
        let log = t
            .append(NewCoordinateLog {
                latitude: Some(1.0),
                longitude: Some(2.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(log.timestamp >= before);
    }

    #[tokio::test]
    async fn test_batch_rejects_whole_batch_on_bad_entry() {
        let t = trace();
        let batch = vec![
            NewCoordinateLog::at(1.0, 1.0, 10),
            NewCoordinateLog {
                latitude: Some(1.0),
                ..Default::default()
            },
        ];
        let err = t.append_batch(batch).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(ref m) if m.starts_with("logs[1]")));
        assert_eq!(t.summary().await.unwrap().total_logs, 0);
    }

    #[tokio::test]
    async fn test_batch_skips_duplicates() {
        let t = trace();
        let batch = vec![
            NewCoordinateLog::at(1.0, 1.0, 10),
            NewCoordinateLog::at(1.0, 1.0, 10),
            NewCoordinateLog::at(1.0, 1.0, 20),
        ];
        assert_eq!(t.append_batch(batch).await.unwrap(), 2);
        assert!(matches!(t.append_batch(vec![]).await, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_batch_entries_need_timestamps() {
        let t = trace();
        let untimed = NewCoordinateLog {
            latitude: Some(1.0),
            longitude: Some(1.0),
            ..Default::default()
        };
        let batch = vec![NewCoordinateLog::at(1.0, 1.0, 10), untimed.clone(), untimed];

        let err = t.append_batch(batch).await.unwrap_err();
        assert!(matches!(&err, CoreError::Validation(msg) if msg.starts_with("logs[1]:")));
        assert_eq!(t.summary().await.unwrap().total_logs, 0);
    }

    #[tokio::test]
    async fn test_list_pages_newest_first() {
        let t = seeded(&[100, 300, 200, 400]).await;
        let page = t.list(Some(2), Some(1)).await.unwrap();
        let stamps: Vec<_> = page.logs.iter().map(|l| l.timestamp).collect();
        assert_eq!(stamps, vec![300, 200]);
        assert_eq!(page.total, 4);
    }

    #[tokio::test]
    async fn test_range_is_inclusive_and_ascending() {
        let t = seeded(&[100, 300, 200, 400]).await;
        let stamps: Vec<_> = t
            .range(200, 400)
            .await
            .unwrap()
            .iter()
            .map(|l| l.timestamp)
            .collect();
        assert_eq!(stamps, vec![200, 300, 400]);
        assert!(matches!(t.range(5, 1).await, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_latest_and_summary() {
        let t = trace();
        assert!(matches!(t.latest().await, Err(CoreError::NotFound(_))));
        let empty = t.summary().await.unwrap();
        assert_eq!(empty.oldest_log, None);

        let t = seeded(&[50, 10, 30]).await;
        assert_eq!(t.latest().await.unwrap().timestamp, 50);
        let summary = t.summary().await.unwrap();
        assert_eq!(summary.total_logs, 3);
        assert_eq!(summary.oldest_log, Some(10));
        assert_eq!(summary.newest_log, Some(50));
    }

    #[tokio::test]
    async fn test_get_delete_clear() {
        let t = seeded(&[1, 2, 3]).await;
        let first = t.latest().await.unwrap();
        assert_eq!(t.get(first.id).await.unwrap(), first);
        t.delete(first.id).await.unwrap();
        assert!(matches!(t.get(first.id).await, Err(CoreError::NotFound(_))));
        assert!(matches!(t.delete(first.id).await, Err(CoreError::NotFound(_))));
        assert_eq!(t.clear().await.unwrap(), 2);
    }
}
