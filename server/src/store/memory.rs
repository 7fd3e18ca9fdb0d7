//! In-memory table backend

use super::{Predicate, Query, Record, StoreError, StoreResult, Table};
use async_trait::async_trait;
use dronepost_shared::{now_ms, RecordId};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A table held in process memory
///
/// Each operation takes the lock once, so a patch is applied to a record
/// atomically with respect to every other reader and writer.
pub struct MemoryTable<R> {
    inner: Arc<RwLock<Inner<R>>>,
}

struct Inner<R> {
    rows: BTreeMap<RecordId, R>,
    next_id: RecordId,
    /// Last assigned creation time, kept so creation times never go backwards
    last_created_at: u64,
}

impl<R> Inner<R> {
    fn allocate(&mut self) -> (RecordId, u64) {
        let id = self.next_id;
        self.next_id += 1;
        self.last_created_at = now_ms().max(self.last_created_at);
        (id, self.last_created_at)
    }
}

impl<R: Record> MemoryTable<R> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                rows: BTreeMap::new(),
                next_id: 1,
                last_created_at: 0,
            })),
        }
    }
}

impl<R: Record> Default for MemoryTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> Table<R> for MemoryTable<R> {
    async fn create(&self, draft: R::Draft) -> StoreResult<R> {
        let mut inner = self.inner.write().await;
        let (id, created_at) = inner.allocate();
        let record = R::build(id, created_at, draft);
        inner.rows.insert(id, record.clone());
        Ok(record)
    }

    async fn create_many(&self, drafts: Vec<R::Draft>) -> StoreResult<usize> {
        let mut inner = self.inner.write().await;
        let mut seen: HashSet<String> = inner.rows.values().filter_map(R::natural_key).collect();
        let mut inserted = 0;

        for draft in drafts {
            let (id, created_at) = (inner.next_id, now_ms().max(inner.last_created_at));
            let record = R::build(id, created_at, draft);

            if let Some(key) = record.natural_key() {
                if !seen.insert(key) {
                    continue;
                }
            }

            inner.next_id = id + 1;
            inner.last_created_at = created_at;
            inner.rows.insert(id, record);
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn find_by_id(&self, id: RecordId) -> StoreResult<Option<R>> {
        Ok(self.inner.read().await.rows.get(&id).cloned())
    }

    async fn find_many(&self, query: Query<R>) -> StoreResult<Vec<R>> {
        let inner = self.inner.read().await;
        let candidates = inner.rows.values().filter(|r| query.matches(r)).cloned();
        Ok(query.run(candidates))
    }

    async fn update(&self, id: RecordId, patch: R::Patch) -> StoreResult<R> {
        let mut inner = self.inner.write().await;
        let row = inner
            .rows
            .get_mut(&id)
            .ok_or(StoreError::NotFound { table: R::TABLE, id })?;

        // Patch a copy so a rejected patch leaves the row untouched
        let mut updated = row.clone();
        updated.apply(patch)?;
        *row = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: RecordId) -> StoreResult<R> {
        self.inner
            .write()
            .await
            .rows
            .remove(&id)
            .ok_or(StoreError::NotFound { table: R::TABLE, id })
    }

    async fn delete_many(&self, predicate: Predicate<R>) -> StoreResult<usize> {
        let mut inner = self.inner.write().await;
        let before = inner.rows.len();
        inner.rows.retain(|_, r| !predicate(r));
        Ok(before - inner.rows.len())
    }

    async fn count(&self, predicate: Option<Predicate<R>>) -> StoreResult<usize> {
        let inner = self.inner.read().await;
        Ok(match predicate {
            Some(p) => inner.rows.values().filter(|r| p(r)).count(),
            None => inner.rows.len(),
        })
    }
}
