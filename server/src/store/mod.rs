//! Storage interface shared by all ground-service components
//!
//! Every entity is kept in its own [`Table`]. The core never sees the
//! backend: it builds a [`Query`] and gets records or a typed
//! [`StoreError`] back. Two backends are provided:
//! - [`MemoryTable`]: `BTreeMap` behind a tokio `RwLock` (tests, ephemeral runs)
//! - [`RedbTable`]: one redb table per entity, JSON-serialized values

mod memory;
mod records;
mod redb_store;

pub use memory::MemoryTable;
pub use records::{CommandDraft, CommandPatch, CoordinateDraft, CoordinatePatch, LogDraft, TelemetryDraft};
pub use redb_store::{RedbStore, RedbTable};

use async_trait::async_trait;
use dronepost_shared::{Command, Coordinate, CoordinateLog, RecordId, Telemetry};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{table} record {id} not found")]
    NotFound { table: &'static str, id: RecordId },

    #[error("{table} record {id} changed concurrently: {reason}")]
    Conflict {
        table: &'static str,
        id: RecordId,
        reason: String,
    },

    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("storage task failed: {0}")]
    Task(String),
}

/// A persisted entity type
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Validated input the record is built from
    type Draft: Send + 'static;
    /// Partial update applied atomically to one record
    type Patch: Send + 'static;

    /// Table name, also used as the redb table name
    const TABLE: &'static str;

    fn id(&self) -> RecordId;

    /// Build a new record from its draft with a storage-assigned id and creation time
    fn build(id: RecordId, created_at: u64, draft: Self::Draft) -> Self;

    /// Apply a partial update in place
    fn apply(&mut self, patch: Self::Patch) -> StoreResult<()>;

    /// Key used by `create_many` to skip duplicates; `None` never collides
    fn natural_key(&self) -> Option<String> {
        None
    }
}

/// Row predicate
pub type Predicate<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Sort key plus direction; ties are broken by id in the same direction
pub struct OrderBy<R> {
    pub key: fn(&R) -> u64,
    pub direction: Direction,
}

impl<R> Clone for OrderBy<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for OrderBy<R> {}

/// `findMany` arguments: filter, order, pagination
pub struct Query<R> {
    filter: Option<Predicate<R>>,
    order: Option<OrderBy<R>>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl<R: Record> Default for Query<R> {
    fn default() -> Self {
        Self::all()
    }
}

impl<R: Record> Query<R> {
    /// Every record, ordered by id
    pub fn all() -> Self {
        Self {
            filter: None,
            order: None,
            limit: None,
            offset: None,
        }
    }

    pub fn filter(mut self, predicate: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(predicate));
        self
    }

    pub fn order_by(mut self, key: fn(&R) -> u64, direction: Direction) -> Self {
        self.order = Some(OrderBy { key, direction });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn matches(&self, record: &R) -> bool {
        self.filter.as_ref().map_or(true, |f| f(record))
    }

    /// Filter, sort and paginate a set of candidate rows
    pub fn run(&self, rows: impl IntoIterator<Item = R>) -> Vec<R> {
        let mut selected: Vec<R> = rows.into_iter().filter(|r| self.matches(r)).collect();

        match self.order {
            Some(OrderBy { key, direction }) => {
                selected.sort_by_key(|r| (key(r), r.id()));
                if direction == Direction::Desc {
                    selected.reverse();
                }
            }
            None => selected.sort_by_key(|r| r.id()),
        }

        selected
            .into_iter()
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Storage operations for one entity type
#[async_trait]
pub trait Table<R: Record>: Send + Sync {
    async fn create(&self, draft: R::Draft) -> StoreResult<R>;

    /// Insert a batch, skipping drafts whose natural key already exists
    /// (in the table or earlier in the batch). Returns the number inserted.
    async fn create_many(&self, drafts: Vec<R::Draft>) -> StoreResult<usize>;

    async fn find_by_id(&self, id: RecordId) -> StoreResult<Option<R>>;

    async fn find_many(&self, query: Query<R>) -> StoreResult<Vec<R>>;

    /// Apply a patch to one record atomically; `NotFound` if absent
    async fn update(&self, id: RecordId, patch: R::Patch) -> StoreResult<R>;

    /// Remove one record and return it; `NotFound` if absent
    async fn delete(&self, id: RecordId) -> StoreResult<R>;

    async fn delete_many(&self, predicate: Predicate<R>) -> StoreResult<usize>;

    async fn count(&self, predicate: Option<Predicate<R>>) -> StoreResult<usize>;
}

/// Handles to every entity table
#[derive(Clone)]
pub struct Store {
    pub coordinates: Arc<dyn Table<Coordinate>>,
    pub logs: Arc<dyn Table<CoordinateLog>>,
    pub commands: Arc<dyn Table<Command>>,
    pub telemetry: Arc<dyn Table<Telemetry>>,
}

impl Store {
    /// Ephemeral store kept entirely in memory
    pub fn in_memory() -> Self {
        Self {
            coordinates: Arc::new(MemoryTable::<Coordinate>::new()),
            logs: Arc::new(MemoryTable::<CoordinateLog>::new()),
            commands: Arc::new(MemoryTable::<Command>::new()),
            telemetry: Arc::new(MemoryTable::<Telemetry>::new()),
        }
    }

    /// Durable store backed by a redb file
    pub fn open(path: &Path) -> StoreResult<Self> {
        Ok(Self::from_redb(&RedbStore::open(path)?))
    }

    pub fn from_redb(db: &RedbStore) -> Self {
        Self {
            coordinates: Arc::new(db.table::<Coordinate>()),
            logs: Arc::new(db.table::<CoordinateLog>()),
            commands: Arc::new(db.table::<Command>()),
            telemetry: Arc::new(db.table::<Telemetry>()),
        }
    }
}
