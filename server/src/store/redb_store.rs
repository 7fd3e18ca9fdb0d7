//! redb-backed table backend
//!
//! Each entity lives in its own table keyed by `u64` id with JSON-encoded
//! values. Id and creation-time counters are kept in a `meta` table so ids
//! are never reused after deletes. redb is synchronous, so every operation
//! runs on the blocking pool in a single transaction.

use super::{Predicate, Query, Record, StoreError, StoreResult, Table};
use async_trait::async_trait;
use dronepost_shared::{now_ms, Command, Coordinate, CoordinateLog, RecordId, Telemetry};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Per-table counters keyed by `{table}.next_id` / `{table}.last_created_at`.
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

fn rows<R: Record>() -> TableDefinition<'static, u64, &'static [u8]> {
    TableDefinition::new(R::TABLE)
}

fn encode<R: Record>(record: &R) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(record).map_err(map_err!(Serialize))
}

fn decode<R: Record>(bytes: &[u8]) -> StoreResult<R> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Run a synchronous storage closure on the blocking pool
async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(map_err!(Task))?
}

/// Shared database handle; cheap to clone
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "redb store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory redb store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.open_table(rows::<Coordinate>()).map_err(map_err!(Table))?;
        txn.open_table(rows::<CoordinateLog>()).map_err(map_err!(Table))?;
        txn.open_table(rows::<Command>()).map_err(map_err!(Table))?;
        txn.open_table(rows::<Telemetry>()).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    pub fn table<R: Record>(&self) -> RedbTable<R> {
        RedbTable {
            db: self.db.clone(),
            _record: PhantomData,
        }
    }
}

/// Id and creation-time counters for one table
struct Counters {
    table: &'static str,
    next_id: RecordId,
    last_created_at: u64,
}

impl Counters {
    fn id_key(table: &str) -> String {
        format!("{table}.next_id")
    }

    fn time_key(table: &str) -> String {
        format!("{table}.last_created_at")
    }

    fn load(txn: &WriteTransaction, table: &'static str) -> StoreResult<Self> {
        let meta = txn.open_table(META).map_err(map_err!(Table))?;
        let next_id = meta
            .get(Self::id_key(table).as_str())
            .map_err(map_err!(Read))?
            .map(|g| g.value())
            .unwrap_or(1);
        let last_created_at = meta
            .get(Self::time_key(table).as_str())
            .map_err(map_err!(Read))?
            .map(|g| g.value())
            .unwrap_or(0);
        Ok(Self {
            table,
            next_id,
            last_created_at,
        })
    }

    /// Id and creation time the next record would get
    fn peek(&self) -> (RecordId, u64) {
        (self.next_id, now_ms().max(self.last_created_at))
    }

    fn commit(&mut self, id: RecordId, created_at: u64) {
        self.next_id = id + 1;
        self.last_created_at = created_at;
    }

    fn save(&self, txn: &WriteTransaction) -> StoreResult<()> {
        let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
        meta.insert(Self::id_key(self.table).as_str(), self.next_id)
            .map_err(map_err!(Write))?;
        meta.insert(Self::time_key(self.table).as_str(), self.last_created_at)
            .map_err(map_err!(Write))?;
        Ok(())
    }
}

/// One entity table inside a [`RedbStore`]
pub struct RedbTable<R> {
    db: Arc<Database>,
    _record: PhantomData<fn() -> R>,
}

#[async_trait]
impl<R: Record> Table<R> for RedbTable<R> {
    async fn create(&self, draft: R::Draft) -> StoreResult<R> {
        let db = self.db.clone();
        blocking(move || {
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            let mut counters = Counters::load(&txn, R::TABLE)?;
            let (id, created_at) = counters.peek();
            let record = R::build(id, created_at, draft);
            {
                let mut table = txn.open_table(rows::<R>()).map_err(map_err!(Table))?;
                let value = encode(&record)?;
                table
                    .insert(id, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
            counters.commit(id, created_at);
            counters.save(&txn)?;
            txn.commit().map_err(map_err!(Transaction))?;
            debug!(table = R::TABLE, id, "record created");
            Ok(record)
        })
        .await
    }

    async fn create_many(&self, drafts: Vec<R::Draft>) -> StoreResult<usize> {
        let db = self.db.clone();
        blocking(move || {
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            let mut counters = Counters::load(&txn, R::TABLE)?;
            let mut inserted = 0;
            {
                let mut table = txn.open_table(rows::<R>()).map_err(map_err!(Table))?;

                let mut seen = HashSet::new();
                for entry in table.iter().map_err(map_err!(Read))? {
                    let (_, value) = entry.map_err(map_err!(Read))?;
                    if let Some(key) = decode::<R>(value.value())?.natural_key() {
                        seen.insert(key);
                    }
                }

                for draft in drafts {
                    let (id, created_at) = counters.peek();
                    let record = R::build(id, created_at, draft);
                    if let Some(key) = record.natural_key() {
                        if !seen.insert(key) {
                            continue;
                        }
                    }

                    let value = encode(&record)?;
                    table
                        .insert(id, value.as_slice())
                        .map_err(map_err!(Write))?;
                    counters.commit(id, created_at);
                    inserted += 1;
                }
            }
            counters.save(&txn)?;
            txn.commit().map_err(map_err!(Transaction))?;
            debug!(table = R::TABLE, inserted, "batch stored");
            Ok(inserted)
        })
        .await
    }

    async fn find_by_id(&self, id: RecordId) -> StoreResult<Option<R>> {
        let db = self.db.clone();
        blocking(move || {
            let txn = db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(rows::<R>()).map_err(map_err!(Table))?;
            match table.get(id).map_err(map_err!(Read))? {
                Some(guard) => Ok(Some(decode(guard.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn find_many(&self, query: Query<R>) -> StoreResult<Vec<R>> {
        let db = self.db.clone();
        blocking(move || {
            let txn = db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(rows::<R>()).map_err(map_err!(Table))?;
            let mut candidates = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let record: R = decode(value.value())?;
                if query.matches(&record) {
                    candidates.push(record);
                }
            }
            Ok(query.run(candidates))
        })
        .await
    }

    async fn update(&self, id: RecordId, patch: R::Patch) -> StoreResult<R> {
        let db = self.db.clone();
        blocking(move || {
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            let record = {
                let mut table = txn.open_table(rows::<R>()).map_err(map_err!(Table))?;
                let current: Option<R> = match table.get(id).map_err(map_err!(Read))? {
                    Some(guard) => Some(decode(guard.value())?),
                    None => None,
                };
                let mut record = current.ok_or(StoreError::NotFound { table: R::TABLE, id })?;
                record.apply(patch)?;

                let value = encode(&record)?;
                table
                    .insert(id, value.as_slice())
                    .map_err(map_err!(Write))?;
                record
            };
            txn.commit().map_err(map_err!(Transaction))?;
            debug!(table = R::TABLE, id, "record updated");
            Ok(record)
        })
        .await
    }

    async fn delete(&self, id: RecordId) -> StoreResult<R> {
        let db = self.db.clone();
        blocking(move || {
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            let removed: Option<R> = {
                let mut table = txn.open_table(rows::<R>()).map_err(map_err!(Table))?;
                let guard = table.remove(id).map_err(map_err!(Write))?;
                match guard {
                    Some(guard) => Some(decode(guard.value())?),
                    None => None,
                }
            };
            let record = removed.ok_or(StoreError::NotFound { table: R::TABLE, id })?;
            txn.commit().map_err(map_err!(Transaction))?;
            debug!(table = R::TABLE, id, "record deleted");
            Ok(record)
        })
        .await
    }

    async fn delete_many(&self, predicate: Predicate<R>) -> StoreResult<usize> {
        let db = self.db.clone();
        blocking(move || {
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            let removed = {
                let mut table = txn.open_table(rows::<R>()).map_err(map_err!(Table))?;
                let mut doomed = Vec::new();
                for entry in table.iter().map_err(map_err!(Read))? {
                    let (key, value) = entry.map_err(map_err!(Read))?;
                    if predicate(&decode::<R>(value.value())?) {
                        doomed.push(key.value());
                    }
                }
                for id in &doomed {
                    table.remove(*id).map_err(map_err!(Write))?;
                }
                doomed.len()
            };
            txn.commit().map_err(map_err!(Transaction))?;
            debug!(table = R::TABLE, removed, "records deleted");
            Ok(removed)
        })
        .await
    }

    async fn count(&self, predicate: Option<Predicate<R>>) -> StoreResult<usize> {
        let db = self.db.clone();
        blocking(move || {
            let txn = db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(rows::<R>()).map_err(map_err!(Table))?;
            let mut count = 0;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let matched = match &predicate {
                    Some(p) => p(&decode::<R>(value.value())?),
                    None => true,
                };
                if matched {
                    count += 1;
                }
            }
            Ok(count)
        })
        .await
    }
}
