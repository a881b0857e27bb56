//! In-memory record store
//!
//! Implements `RecordStore` over a `BTreeMap` behind one `parking_lot`
//! lock. Bulk renumbering validates every target first and then applies the
//! whole assignment under a single write lock, so readers never observe a
//! partial spread.

use crate::algorithms::ordering::sort_records;
use crate::algorithms::partition::PartitionFilter;
use crate::domain::entities::{RankAssignment, RankedRecord};
use crate::domain::errors::PersistenceError;
use crate::domain::value_objects::{FieldKind, Rank, RecordId};
use crate::ports::outbound::{RankQuery, RecordStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Record store for tests and embedded use.
///
/// The schema starts with a decimal `rank` field.
pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<RecordId, RankedRecord>>,
    schema: HashMap<String, FieldKind>,
    failing_saves: AtomicUsize,
    failing_renumbers: AtomicUsize,
    rejected: RwLock<HashSet<RecordId>>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::with_schema([("rank", FieldKind::Decimal)])
    }

    /// Store whose schema holds exactly `fields`.
    pub fn with_schema<'a>(fields: impl IntoIterator<Item = (&'a str, FieldKind)>) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            schema: fields
                .into_iter()
                .map(|(name, kind)| (name.to_string(), kind))
                .collect(),
            failing_saves: AtomicUsize::new(0),
            failing_renumbers: AtomicUsize::new(0),
            rejected: RwLock::new(HashSet::new()),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.schema.insert(name.into(), kind);
        self
    }

    /// Seed records as already persisted, bypassing every hook.
    pub fn seed(&self, records: impl IntoIterator<Item = RankedRecord>) {
        let mut stored = self.records.write();
        for record in records {
            stored.insert(record.id, record.into_persisted());
        }
    }

    /// Make the next `count` saves fail with `WriteRejected`.
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` bulk renumberings fail with `Unavailable`.
    pub fn fail_next_renumbers(&self, count: usize) {
        self.failing_renumbers.store(count, Ordering::SeqCst);
    }

    /// Reject every save of `id` until [`Self::accept_saves_for`].
    pub fn reject_saves_for(&self, id: RecordId) {
        self.rejected.write().insert(id);
    }

    pub fn accept_saves_for(&self, id: RecordId) {
        self.rejected.write().remove(&id);
    }

    pub fn get(&self, id: RecordId) -> Option<RankedRecord> {
        self.records.read().get(&id).cloned()
    }

    /// Every stored record, by id.
    pub fn snapshot(&self) -> Vec<RankedRecord> {
        self.records.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn describe_field(&self, field: &str) -> Result<Option<FieldKind>, PersistenceError> {
        Ok(self.schema.get(field).copied())
    }

    async fn query_ordered(&self, query: &RankQuery) -> Result<Vec<RankedRecord>, PersistenceError> {
        let mut matched: Vec<RankedRecord> = self
            .records
            .read()
            .values()
            .filter(|record| query.admits(record))
            .cloned()
            .collect();
        sort_records(&query.filter, &mut matched, query.direction);

        if query.distinct_ranks {
            matched.dedup_by_key(|record| record.current_rank());
        }
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn count_with_rank(&self, filter: &PartitionFilter, rank: Rank) -> Result<usize, PersistenceError> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|record| record.current_rank() == Some(rank) && filter.matches(record))
            .count())
    }

    async fn bulk_renumber(
        &self,
        filter: &PartitionFilter,
        assignment: &RankAssignment,
    ) -> Result<(), PersistenceError> {
        if Self::take_failure(&self.failing_renumbers) {
            return Err(PersistenceError::Unavailable("injected renumber failure".to_string()));
        }
        let mut records = self.records.write();

        for (id, _) in &assignment.entries {
            let record = records.get(id).ok_or(PersistenceError::UnknownRecord(*id))?;
            if !filter.matches(record) {
                return Err(PersistenceError::OutsidePartition(*id));
            }
        }

        for (id, rank) in &assignment.entries {
            if let Some(record) = records.get_mut(id) {
                record.set_rank(Some(*rank));
                record.mark_persisted();
                if let Some(touch) = assignment.touch {
                    record.tiebreak = touch;
                }
            }
        }

        debug!(
            renumbered = assignment.len(),
            touched = assignment.touch.is_some(),
            "Applied bulk renumbering"
        );
        Ok(())
    }

    async fn save(&self, record: &RankedRecord) -> Result<(), PersistenceError> {
        if Self::take_failure(&self.failing_saves) || self.rejected.read().contains(&record.id) {
            return Err(PersistenceError::WriteRejected {
                id: record.id,
                reason: "injected failure".to_string(),
            });
        }
        self.records
            .write()
            .insert(record.id, record.clone().into_persisted());
        Ok(())
    }

    async fn fetch(&self, id: RecordId) -> Result<Option<RankedRecord>, PersistenceError> {
        Ok(self.get(id))
    }
}
