//! Coordinate lifecycle: detected -> visited -> delivered
//!
//! Vehicles poll the unvisited and pending queues; both are plain queries
//! over stored state ordered by creation time, so there is no in-memory
//! "current target" to drift out of sync.

use crate::error::{CoreError, CoreResult};
use crate::store::{CoordinateDraft, CoordinatePatch, Direction, Query, Table};
use crate::validate;
use dronepost_shared::{Coordinate, NewCoordinate, RecordId};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct CoordinateLifecycle {
    coordinates: Arc<dyn Table<Coordinate>>,
}

impl CoordinateLifecycle {
    pub fn new(coordinates: Arc<dyn Table<Coordinate>>) -> Self {
        Self { coordinates }
    }

    /// Record a detected target; it starts neither visited nor delivered
    pub async fn record(&self, input: NewCoordinate) -> CoreResult<Coordinate> {
        let (latitude, longitude) = validate::position(input.latitude, input.longitude)?;
        let altitude = validate::optional_number("altitude", input.altitude)?;

        let coord = self
            .coordinates
            .create(CoordinateDraft {
                latitude,
                longitude,
                altitude,
                timestamp: input.timestamp,
            })
            .await?;

        info!(id = coord.id, latitude, longitude, "coordinate recorded");
        Ok(coord)
    }

    pub async fn get(&self, id: RecordId) -> CoreResult<Coordinate> {
        self.coordinates
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("coordinate {id}")))
    }

    /// Administrative listing, newest first
    pub async fn list(
        &self,
        is_visited: Option<bool>,
        is_delivered: Option<bool>,
    ) -> CoreResult<Vec<Coordinate>> {
        let query = Query::all()
            .filter(move |c: &Coordinate| {
                is_visited.map_or(true, |v| c.is_visited == v)
                    && is_delivered.map_or(true, |d| c.is_delivered == d)
            })
            .order_by(|c| c.created_at, Direction::Desc);
        Ok(self.coordinates.find_many(query).await?)
    }

    /// Idempotent; re-marking a visited coordinate succeeds unchanged
    pub async fn mark_visited(&self, id: RecordId) -> CoreResult<Coordinate> {
        let patch = CoordinatePatch {
            is_visited: Some(true),
            is_delivered: None,
        };
        let coord = self.coordinates.update(id, patch).await?;
        debug!(id, "coordinate visited");
        Ok(coord)
    }

    /// Delivery implies a visit; both flags go out in one update
    pub async fn mark_delivered(&self, id: RecordId) -> CoreResult<Coordinate> {
        let patch = CoordinatePatch {
            is_visited: Some(true),
            is_delivered: Some(true),
        };
        let coord = self.coordinates.update(id, patch).await?;
        debug!(id, "coordinate delivered");
        Ok(coord)
    }

    /// Targets still to approach, oldest detection first
    pub async fn list_unvisited(&self) -> CoreResult<Vec<Coordinate>> {
        let query = Query::all()
            .filter(|c: &Coordinate| !c.is_visited)
            .order_by(|c| c.created_at, Direction::Asc);
        Ok(self.coordinates.find_many(query).await?)
    }

    /// Visited but undelivered targets, oldest first
    pub async fn list_pending(&self) -> CoreResult<Vec<Coordinate>> {
        let query = Query::all()
            .filter(|c: &Coordinate| c.is_visited && !c.is_delivered)
            .order_by(|c| c.created_at, Direction::Asc);
        Ok(self.coordinates.find_many(query).await?)
    }

    pub async fn delete(&self, id: RecordId) -> CoreResult<Coordinate> {
        let coord = self.coordinates.delete(id).await?;
        info!(id, "coordinate deleted");
        Ok(coord)
    }
}
