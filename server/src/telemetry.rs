//! Telemetry ingestion and windowed statistics

use crate::error::{CoreError, CoreResult};
use crate::store::{Direction, Query, Table, TelemetryDraft};
use crate::validate;
use dronepost_shared::limits::{self, MS_PER_DAY, MS_PER_HOUR};
use dronepost_shared::{now_ms, NewTelemetry, RecordId, Telemetry, TelemetryStats};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct TelemetryAggregator {
    telemetry: Arc<dyn Table<Telemetry>>,
    list_limit: usize,
    stats_window_hours: f64,
}

fn by_timestamp(t: &Telemetry) -> u64 {
    t.timestamp
}

/// Mean of the values that are present; `None` when there are none
fn mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, n) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Statistics over samples sorted oldest first; `None` for an empty window
pub fn summarize(drone_id: &str, window_hours: f64, samples: &[Telemetry]) -> Option<TelemetryStats> {
    let first = samples.first()?;
    let last = samples.last()?;

    let max_altitude = samples
        .iter()
        .map(|t| t.altitude)
        .fold(f64::NEG_INFINITY, f64::max);
    let min_battery_level = samples
        .iter()
        .filter_map(|t| t.battery_level)
        .reduce(f64::min);

    Some(TelemetryStats {
        drone_id: drone_id.to_string(),
        window_hours,
        data_points: samples.len(),
        average_battery_level: mean(samples.iter().map(|t| t.battery_level)),
        average_altitude: mean(samples.iter().map(|t| Some(t.altitude))).unwrap_or_default(),
        average_ground_speed: mean(samples.iter().map(|t| t.ground_speed)),
        max_altitude,
        min_battery_level,
        first_data_point: first.timestamp,
        last_data_point: last.timestamp,
    })
}

impl TelemetryAggregator {
    pub fn new(telemetry: Arc<dyn Table<Telemetry>>) -> Self {
        Self {
            telemetry,
            list_limit: limits::DEFAULT_TELEMETRY_LIST_LIMIT,
            stats_window_hours: limits::DEFAULT_STATS_WINDOW_HOURS,
        }
    }

    pub fn with_list_limit(mut self, limit: usize) -> Self {
        self.list_limit = limit.max(1);
        self
    }

    pub fn with_stats_window(mut self, hours: f64) -> Self {
        self.stats_window_hours = hours;
        self
    }

    pub async fn ingest(&self, input: NewTelemetry) -> CoreResult<Telemetry> {
        let drone_id = validate::drone_id(&input.drone_id)?;
        let (latitude, longitude) = validate::position(input.latitude, input.longitude)?;
        let altitude = validate::required_number("altitude", input.altitude)?;

        let draft = TelemetryDraft {
            drone_id,
            latitude,
            longitude,
            altitude,
            heading: validate::optional_number("heading", input.heading)?,
            ground_speed: validate::optional_number("groundSpeed", input.ground_speed)?,
            vertical_speed: validate::optional_number("verticalSpeed", input.vertical_speed)?,
            battery_level: validate::optional_number("batteryLevel", input.battery_level)?,
            voltage: validate::optional_number("voltage", input.voltage)?,
            current: validate::optional_number("current", input.current)?,
            gps_fix_type: input.gps_fix_type,
            satellite_count: input.satellite_count,
            flight_mode: input.flight_mode,
            armed: input.armed,
            timestamp: input.timestamp.unwrap_or_else(now_ms),
        };

        let sample = self.telemetry.create(draft).await?;
        debug!(
            id = sample.id,
            drone_id = %sample.drone_id,
            battery = ?sample.battery_level,
            "telemetry ingested"
        );
        Ok(sample)
    }

    /// Most recent sample for the vehicle
    pub async fn latest(&self, drone_id: &str) -> CoreResult<Telemetry> {
        let drone = drone_id.to_string();
        let query = Query::all()
            .filter(move |t: &Telemetry| t.drone_id == drone)
            .order_by(by_timestamp, Direction::Desc)
            .limit(1);

        self.telemetry
            .find_many(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::NotFound(format!("telemetry for {drone_id}")))
    }

    /// Statistics over the last `hours` (configured default when absent)
    pub async fn stats(&self, drone_id: &str, hours: Option<f64>) -> CoreResult<TelemetryStats> {
        self.stats_at(drone_id, hours.unwrap_or(self.stats_window_hours), now_ms())
            .await
    }

    /// Statistics over `[now - hours, now]`
    pub async fn stats_at(&self, drone_id: &str, hours: f64, now: u64) -> CoreResult<TelemetryStats> {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(CoreError::validation(format!(
                "window hours must be positive, got {hours}"
            )));
        }

        let since = now.saturating_sub((hours * MS_PER_HOUR as f64) as u64);
        let drone = drone_id.to_string();
        let query = Query::all()
            .filter(move |t: &Telemetry| t.drone_id == drone && t.timestamp >= since)
            .order_by(by_timestamp, Direction::Asc);

        let samples = self.telemetry.find_many(query).await?;
        summarize(drone_id, hours, &samples).ok_or_else(|| {
            CoreError::NotFound(format!("telemetry for {drone_id} in the last {hours} hours"))
        })
    }

    /// Newest first, bounded by `limit` (configured default when absent)
    pub async fn list(
        &self,
        drone_id: Option<String>,
        since: Option<u64>,
        until: Option<u64>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Telemetry>> {
        if let (Some(since), Some(until)) = (since, until) {
            if since > until {
                return Err(CoreError::validation(format!(
                    "since {since} is after until {until}"
                )));
            }
        }

        let query = Query::all()
            .filter(move |t: &Telemetry| {
                drone_id.as_deref().map_or(true, |d| t.drone_id == d)
                    && since.map_or(true, |s| t.timestamp >= s)
                    && until.map_or(true, |u| t.timestamp <= u)
            })
            .order_by(by_timestamp, Direction::Desc)
            .limit(limit.unwrap_or(self.list_limit));
        Ok(self.telemetry.find_many(query).await?)
    }

    pub async fn get(&self, id: RecordId) -> CoreResult<Telemetry> {
        self.telemetry
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("telemetry {id}")))
    }

    /// Delete every sample older than `days` days
    pub async fn purge_older_than(&self, days: u32) -> CoreResult<usize> {
        self.purge_older_than_at(days, now_ms()).await
    }

    pub async fn purge_older_than_at(&self, days: u32, now: u64) -> CoreResult<usize> {
        if days == 0 {
            return Err(CoreError::validation("days must be positive"));
        }

        let cutoff = now.saturating_sub(u64::from(days) * MS_PER_DAY);
        let removed = self
            .telemetry
            .delete_many(Arc::new(move |t: &Telemetry| t.timestamp < cutoff))
            .await?;

        info!(days, cutoff, removed, "telemetry purged");
        Ok(removed)
    }
}
