//! Promote a GPS trace sample into a coordinate
//!
//! An operator trigger carries only a timestamp. The sample chosen is the
//! latest one inside `trigger ± window`; clock skew between the trigger and
//! the vehicle's last report is absorbed by the window.

use crate::error::{CoreError, CoreResult};
use crate::store::{CoordinateDraft, Direction, Query, Table};
use dronepost_shared::{limits, Coordinate, CoordinateLog, Correlation};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct LogCorrelator {
    logs: Arc<dyn Table<CoordinateLog>>,
    coordinates: Arc<dyn Table<Coordinate>>,
    window_ms: u64,
}

impl LogCorrelator {
    pub fn new(logs: Arc<dyn Table<CoordinateLog>>, coordinates: Arc<dyn Table<Coordinate>>) -> Self {
        Self {
            logs,
            coordinates,
            window_ms: limits::CORRELATION_WINDOW_MS,
        }
    }

    pub fn with_window(mut self, window_ms: u64) -> Self {
        self.window_ms = window_ms;
        self
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub async fn correlate(&self, trigger: u64) -> CoreResult<Correlation> {
        let low = trigger.saturating_sub(self.window_ms);
        let high = trigger.saturating_add(self.window_ms);

        // Desc by (timestamp, id): the first row is the latest sample, and
        // among equal timestamps the most recently stored one
        let query = Query::all()
            .filter(move |l: &CoordinateLog| (low..=high).contains(&l.timestamp))
            .order_by(|l| l.timestamp, Direction::Desc)
            .limit(1);

        let Some(source) = self.logs.find_many(query).await?.into_iter().next() else {
            debug!(trigger, window_ms = self.window_ms, "no log sample in window");
            return Err(CoreError::NoMatchingLog {
                trigger,
                window_ms: self.window_ms,
            });
        };

        let coordinate = self
            .coordinates
            .create(CoordinateDraft {
                latitude: source.latitude,
                longitude: source.longitude,
                altitude: source.altitude,
                timestamp: Some(source.timestamp),
            })
            .await?;

        info!(
            trigger,
            log_id = source.id,
            coordinate_id = coordinate.id,
            offset_ms = source.timestamp as i64 - trigger as i64,
            "log sample promoted to coordinate"
        );

        Ok(Correlation {
            coordinate,
            source_log_id: source.id,
        })
    }
}
