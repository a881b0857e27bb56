//! Ranked List Service
//!
//! Main service implementing RankingApi.
//!
//! Every rank mutation follows the same pipeline:
//! 1. Resolve the partition of the record
//! 2. Read the nearest neighbours through the record store
//! 3. Allocate a rank and write it onto the record
//! 4. Unless skip-persistence is active: stamp, save, check for a collision
//! 5. On collision, spread the whole partition and refresh the record

use crate::algorithms::allocator;
use crate::algorithms::collision::{collision_candidate, is_collision};
use crate::algorithms::partition::{PartitionDefinition, PartitionFilter, PartitionResolver};
use crate::algorithms::spreader::{plan_collection_spread, plan_spread};
use crate::config::{RankSettings, RankedListConfig};
use crate::context;
use crate::domain::entities::{RankAssignment, RankedRecord};
use crate::domain::errors::{ConfigError, PersistenceError, RankError};
use crate::domain::value_objects::{
    CollectionId, Direction, FieldValue, NewItemPlacement, Rank, RankBound, RecordId, Timestamp,
};
use crate::ports::inbound::RankingApi;
use crate::ports::outbound::{RankQuery, RecordStore, SystemTimeSource, TimeSource};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builder validating configuration against the record store.
pub struct RankedListBuilder<S> {
    store: Arc<S>,
    config: RankedListConfig,
    definition: PartitionDefinition,
    clock: Arc<dyn TimeSource>,
}

impl<S: RecordStore> RankedListBuilder<S> {
    pub fn partition(mut self, definition: PartitionDefinition) -> Self {
        self.definition = definition;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Fails fast on any configuration error; no list is built.
    pub async fn build(self) -> Result<RankedList<S>, ConfigError> {
        self.config.validate()?;

        let field = self
            .store
            .describe_field(&self.config.rank_field)
            .await
            .map_err(|e| ConfigError::Introspection(e.to_string()))?;
        let settings = self.config.resolve(field)?;
        let resolver = PartitionResolver::new(&self.definition)?;

        info!(
            collection = %settings.collection,
            rank_field = %settings.rank_field,
            step = %settings.step,
            precision = ?settings.precision,
            new_item_at = ?settings.new_item_at,
            scopes = self.definition.scopes().len(),
            "Ranked list configured"
        );

        Ok(RankedList {
            store: self.store,
            settings,
            resolver,
            clock: self.clock,
        })
    }
}

/// Ranked view over one collection of a record store.
pub struct RankedList<S> {
    store: Arc<S>,
    settings: RankSettings,
    resolver: PartitionResolver,
    clock: Arc<dyn TimeSource>,
}

impl<S: RecordStore> RankedList<S> {
    pub fn builder(store: Arc<S>, config: RankedListConfig) -> RankedListBuilder<S> {
        RankedListBuilder {
            store,
            config,
            definition: PartitionDefinition::new(),
            clock: Arc::new(SystemTimeSource),
        }
    }

    pub fn settings(&self) -> &RankSettings {
        &self.settings
    }

    pub fn collection_id(&self) -> &CollectionId {
        &self.settings.collection
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Partition `record` competes in.
    pub fn partition_of(&self, record: &RankedRecord) -> PartitionFilter {
        self.resolver.resolve(record)
    }

    /// Partition identified by explicit scope values.
    pub fn partition_for(&self, values: &BTreeMap<String, FieldValue>) -> PartitionFilter {
        self.resolver.resolve_values(values)
    }

    /// Every partition of the collection.
    pub fn collection(&self) -> PartitionFilter {
        self.resolver.collection()
    }

    pub fn skips_persistence(&self) -> bool {
        context::skips_persistence(&self.settings.collection)
    }

    pub fn avoids_collisions(&self) -> bool {
        context::avoids_collisions(&self.settings.collection, self.settings.avoid_collisions)
    }

    /// Run `future` with skip-persistence active for this collection and `others`.
    pub async fn with_skip_persistence<F>(&self, others: &[CollectionId], future: F) -> F::Output
    where
        F: Future,
    {
        let mut collections = Vec::with_capacity(others.len() + 1);
        collections.push(self.settings.collection.clone());
        collections.extend_from_slice(others);
        context::with_skip_persistence(&collections, future).await
    }

    /// Run `future` with collision avoidance forced on or off for this collection.
    pub async fn with_avoid_collisions<F>(&self, enabled: bool, future: F) -> F::Output
    where
        F: Future,
    {
        context::with_avoid_collisions(&self.settings.collection, enabled, future).await
    }

    fn ensure_same_partition(
        &self,
        record: &RankedRecord,
        reference: &RankedRecord,
    ) -> Result<PartitionFilter, RankError> {
        let filter = self.partition_of(reference);
        if filter.matches(record) {
            Ok(filter)
        } else {
            Err(RankError::CrossPartition {
                record: record.id,
                reference: reference.id,
            })
        }
    }

    async fn neighbour_ranks(&self, query: &RankQuery) -> Result<Vec<Rank>, RankError> {
        let neighbours: Vec<Rank> = self
            .store
            .query_ordered(query)
            .await?
            .iter()
            .filter_map(RankedRecord::current_rank)
            .collect();
        debug!(
            partition = %query.filter.key(),
            direction = ?query.direction,
            found = neighbours.len(),
            "Read neighbour ranks"
        );
        Ok(neighbours)
    }

    async fn edge_rank(
        &self,
        filter: &PartitionFilter,
        direction: Direction,
        exclude: RecordId,
    ) -> Result<Option<Rank>, RankError> {
        let query = RankQuery::new(filter.clone(), direction)
            .excluding(exclude)
            .limit(1);
        Ok(self.neighbour_ranks(&query).await?.first().copied())
    }

    /// Rank at stored precision; flags a midpoint that fell onto a neighbour.
    fn allocated(&self, record: &RankedRecord, rank: Rank, neighbours: &[Rank]) -> Rank {
        let rank = self.settings.precision.apply(rank);
        if neighbours.contains(&rank) {
            warn!(
                record = %record.id,
                rank = %rank,
                "Rank precision exhausted between neighbours"
            );
        }
        rank
    }

    async fn place_new(&self, record: &mut RankedRecord) -> Result<(), RankError> {
        let filter = self.partition_of(record);
        let step = self.settings.step;
        let policy = self.settings.new_item_at;

        let rank = match policy {
            NewItemPlacement::Highest => {
                let highest = self.edge_rank(&filter, Direction::Ascending, record.id).await?;
                allocator::new_item_rank(policy, highest, None, step)?
            }
            NewItemPlacement::Lowest => {
                let lowest = self.edge_rank(&filter, Direction::Descending, record.id).await?;
                allocator::new_item_rank(policy, None, lowest, step)?
            }
            NewItemPlacement::Unranked => None,
        };

        if let Some(rank) = rank {
            record.set_rank(Some(self.settings.precision.apply(rank)));
        }
        debug!(record = %record.id, policy = ?policy, rank = ?record.current_rank(), "Placed new record");
        Ok(())
    }

    /// Write `rank` onto the record and persist it through the hooks.
    async fn commit_rank(&self, record: &mut RankedRecord, rank: Option<Rank>) -> Result<(), RankError> {
        let previous_rank = record.current_rank();
        let previous_changed = record.rank_changed();
        let rank = rank.map(|rank| self.settings.precision.apply(rank));
        record.set_rank(rank);
        debug!(record = %record.id, from = ?previous_rank, to = ?rank, "Rank assigned");

        if self.skips_persistence() {
            return Ok(());
        }
        if let Err(err) = self.write(record).await {
            record.restore_rank(previous_rank, previous_changed);
            return Err(err.into());
        }
        self.after_save(record).await.map(|_| ())
    }

    /// Stamp the tiebreak and save; the stamp is rolled back on failure.
    async fn write(&self, record: &mut RankedRecord) -> Result<(), PersistenceError> {
        let previous_tiebreak = record.tiebreak;
        record.tiebreak = self.clock.now();
        if let Err(err) = self.store.save(record).await {
            record.tiebreak = previous_tiebreak;
            warn!(record = %record.id, error = %err, "Save failed; in-memory rank rolled back");
            return Err(err);
        }
        Ok(())
    }

    /// Collision hook. Returns true when the partition was spread.
    ///
    /// The record stays dirty until the check (and any spread) succeeds, so
    /// a retried `update` checks the same rank again.
    async fn after_save(&self, record: &mut RankedRecord) -> Result<bool, RankError> {
        let Some(rank) = collision_candidate(record, self.avoids_collisions()) else {
            record.mark_persisted();
            return Ok(false);
        };

        let filter = self.partition_of(record);
        let holders = self.store.count_with_rank(&filter, rank).await?;
        if !is_collision(holders) {
            record.mark_persisted();
            return Ok(false);
        }

        warn!(
            record = %record.id,
            rank = %rank,
            holders,
            partition = %filter.key(),
            "Rank collision; spreading partition"
        );
        self.spread(&filter).await?;
        self.refresh(record).await?;
        record.mark_persisted();
        Ok(true)
    }

    async fn refresh(&self, record: &mut RankedRecord) -> Result<(), RankError> {
        if let Some(stored) = self.store.fetch(record.id).await? {
            *record = stored;
        }
        Ok(())
    }

    fn touch(&self) -> Option<Timestamp> {
        self.settings.touch_on_update.then(|| self.clock.now())
    }

    async fn spread(&self, filter: &PartitionFilter) -> Result<RankAssignment, RankError> {
        if filter.is_collection_wide() {
            return self.spread_collection().await;
        }

        let records = self
            .store
            .query_ordered(&RankQuery::new(filter.clone(), Direction::Ascending))
            .await?;
        let assignment = plan_spread(filter, &records, self.settings.step)?.with_touch(self.touch());
        self.store.bulk_renumber(filter, &assignment).await?;

        info!(
            collection = %self.settings.collection,
            partition = %filter.key(),
            renumbered = assignment.len(),
            "Spread partition ranks"
        );
        Ok(assignment)
    }

    async fn spread_collection(&self) -> Result<RankAssignment, RankError> {
        let filter = self.collection();
        let records = self
            .store
            .query_ordered(&RankQuery::new(filter.clone(), Direction::Ascending))
            .await?;
        let assignment = plan_collection_spread(&self.resolver, &records, self.settings.step)?
            .with_touch(self.touch());
        self.store.bulk_renumber(&filter, &assignment).await?;

        info!(
            collection = %self.settings.collection,
            renumbered = assignment.len(),
            "Spread ranks of every partition"
        );
        Ok(assignment)
    }
}

/// Put `reference` first in a nearest-first neighbour list, keeping two.
fn anchored(reference: Rank, mut neighbours: Vec<Rank>) -> Vec<Rank> {
    if neighbours.first() != Some(&reference) {
        neighbours.insert(0, reference);
    }
    neighbours.truncate(2);
    neighbours
}

#[async_trait]
impl<S: RecordStore> RankingApi for RankedList<S> {
    async fn create(&self, record: &mut RankedRecord) -> Result<(), RankError> {
        if self.skips_persistence() {
            self.store.save(record).await?;
            record.mark_persisted();
            return Ok(());
        }

        let previous_rank = record.current_rank();
        let previous_changed = record.rank_changed();
        match previous_rank {
            None => self.place_new(record).await?,
            Some(rank) => {
                let stored = self.settings.precision.apply(rank);
                if stored != rank {
                    record.set_rank(Some(stored));
                }
            }
        }

        if let Err(err) = self.write(record).await {
            record.restore_rank(previous_rank, previous_changed);
            return Err(err.into());
        }
        self.after_save(record).await?;
        Ok(())
    }

    async fn update(&self, record: &mut RankedRecord) -> Result<(), RankError> {
        if self.skips_persistence() {
            self.store.save(record).await?;
            record.mark_persisted();
            return Ok(());
        }

        self.write(record).await?;
        self.after_save(record).await?;
        Ok(())
    }

    async fn set_rank(&self, record: &mut RankedRecord, rank: Option<Rank>) -> Result<(), RankError> {
        self.commit_rank(record, rank).await
    }

    async fn set_rank_above(&self, record: &mut RankedRecord, reference: &RankedRecord) -> Result<(), RankError> {
        let Some(reference_rank) = reference.current_rank() else {
            debug!(record = %record.id, reference = %reference.id, "Reference unranked; nothing to do");
            return Ok(());
        };
        if record.id == reference.id {
            return Ok(());
        }
        let filter = self.ensure_same_partition(record, reference)?;

        let query = RankQuery::new(filter, Direction::Descending)
            .bound(RankBound::LessOrEqual(reference_rank))
            .excluding(record.id)
            .distinct_ranks()
            .limit(2);
        let neighbours = anchored(reference_rank, self.neighbour_ranks(&query).await?);

        let Some(rank) = allocator::rank_above_reference(&neighbours) else {
            return Ok(());
        };
        let rank = self.allocated(record, rank, &neighbours);
        self.commit_rank(record, Some(rank)).await
    }

    async fn set_rank_below(&self, record: &mut RankedRecord, reference: &RankedRecord) -> Result<(), RankError> {
        let Some(reference_rank) = reference.current_rank() else {
            debug!(record = %record.id, reference = %reference.id, "Reference unranked; nothing to do");
            return Ok(());
        };
        if record.id == reference.id {
            return Ok(());
        }
        let filter = self.ensure_same_partition(record, reference)?;

        let query = RankQuery::new(filter, Direction::Ascending)
            .bound(RankBound::GreaterOrEqual(reference_rank))
            .excluding(record.id)
            .distinct_ranks()
            .limit(2);
        let neighbours = anchored(reference_rank, self.neighbour_ranks(&query).await?);

        let Some(rank) = allocator::rank_below_reference(&neighbours, self.settings.step)? else {
            return Ok(());
        };
        let rank = self.allocated(record, rank, &neighbours);
        self.commit_rank(record, Some(rank)).await
    }

    async fn set_rank_between(
        &self,
        record: &mut RankedRecord,
        upper: &RankedRecord,
        lower: &RankedRecord,
    ) -> Result<(), RankError> {
        match (upper.current_rank(), lower.current_rank()) {
            (Some(a), Some(b)) => {
                self.ensure_same_partition(record, upper)?;
                self.ensure_same_partition(record, lower)?;
                let rank = allocator::rank_between(Some(a.min(b)), Some(a.max(b)), self.settings.step)?;
                let rank = self.allocated(record, rank, &[a, b]);
                self.commit_rank(record, Some(rank)).await
            }
            (Some(_), None) => self.set_rank_below(record, upper).await,
            (None, Some(_)) => self.set_rank_above(record, lower).await,
            (None, None) => Ok(()),
        }
    }

    async fn swap_rank_with(&self, a: &mut RankedRecord, b: &mut RankedRecord) -> Result<(), RankError> {
        if a.id == b.id {
            return Ok(());
        }
        self.ensure_same_partition(a, b)?;

        let (rank_a, rank_b) = (a.current_rank(), b.current_rank());
        if rank_a == rank_b {
            return Ok(());
        }
        let (changed_a, changed_b) = (a.rank_changed(), b.rank_changed());
        a.set_rank(rank_b);
        b.set_rank(rank_a);
        debug!(a = %a.id, b = %b.id, "Swapped ranks");

        if self.skips_persistence() {
            return Ok(());
        }

        if let Err(err) = self.write(a).await {
            a.restore_rank(rank_a, changed_a);
            b.restore_rank(rank_b, changed_b);
            return Err(err.into());
        }
        if let Err(err) = self.write(b).await {
            a.restore_rank(rank_a, changed_a);
            b.restore_rank(rank_b, changed_b);
            if let Err(undo) = self.write(a).await {
                warn!(record = %a.id, error = %undo, "Could not undo half-applied swap");
            }
            return Err(err.into());
        }

        if self.after_save(a).await? {
            b.mark_persisted();
            self.refresh(b).await
        } else {
            self.after_save(b).await.map(|_| ())
        }
    }

    async fn increase_rank(&self, record: &mut RankedRecord, count: usize) -> Result<(), RankError> {
        let Some(current) = record.current_rank() else {
            return Ok(());
        };
        if count == 0 {
            return Ok(());
        }

        let query = RankQuery::new(self.partition_of(record), Direction::Descending)
            .bound(RankBound::LessThan(current))
            .excluding(record.id)
            .limit(count.saturating_add(1));
        let neighbours = self.neighbour_ranks(&query).await?;

        let Some(rank) = allocator::rank_moving_up(&neighbours, count) else {
            debug!(record = %record.id, "Already highest; nothing to do");
            return Ok(());
        };
        let rank = self.allocated(record, rank, &neighbours);
        self.commit_rank(record, Some(rank)).await
    }

    async fn decrease_rank(&self, record: &mut RankedRecord, count: usize) -> Result<(), RankError> {
        let Some(current) = record.current_rank() else {
            return Ok(());
        };
        if count == 0 {
            return Ok(());
        }

        let query = RankQuery::new(self.partition_of(record), Direction::Ascending)
            .bound(RankBound::GreaterThan(current))
            .excluding(record.id)
            .limit(count.saturating_add(1));
        let neighbours = self.neighbour_ranks(&query).await?;

        let Some(rank) = allocator::rank_moving_down(&neighbours, count, self.settings.step)? else {
            debug!(record = %record.id, "Already lowest; nothing to do");
            return Ok(());
        };
        let rank = self.allocated(record, rank, &neighbours);
        self.commit_rank(record, Some(rank)).await
    }

    async fn is_highest(&self, record: &RankedRecord) -> Result<bool, RankError> {
        if !record.is_ranked() {
            return Ok(false);
        }
        let first = self.highest_items(&self.partition_of(record), Some(1)).await?;
        Ok(first.first().map(|top| top.id) == Some(record.id))
    }

    async fn is_lowest(&self, record: &RankedRecord) -> Result<bool, RankError> {
        if !record.is_ranked() {
            return Ok(false);
        }
        let last = self.lowest_items(&self.partition_of(record), Some(1)).await?;
        Ok(last.first().map(|bottom| bottom.id) == Some(record.id))
    }

    async fn higher_items(&self, record: &RankedRecord, limit: Option<usize>) -> Result<Vec<RankedRecord>, RankError> {
        let Some(current) = record.current_rank() else {
            return Ok(Vec::new());
        };
        let mut query = RankQuery::new(self.partition_of(record), Direction::Descending)
            .bound(RankBound::LessOrEqual(current))
            .excluding(record.id)
            .after(record);
        query.limit = limit;
        Ok(self.store.query_ordered(&query).await?)
    }

    async fn lower_items(&self, record: &RankedRecord, limit: Option<usize>) -> Result<Vec<RankedRecord>, RankError> {
        let Some(current) = record.current_rank() else {
            return Ok(Vec::new());
        };
        let mut query = RankQuery::new(self.partition_of(record), Direction::Ascending)
            .bound(RankBound::GreaterOrEqual(current))
            .excluding(record.id)
            .after(record);
        query.limit = limit;
        Ok(self.store.query_ordered(&query).await?)
    }

    async fn highest_items(&self, partition: &PartitionFilter, limit: Option<usize>) -> Result<Vec<RankedRecord>, RankError> {
        let mut query = RankQuery::new(partition.clone(), Direction::Ascending);
        query.limit = limit;
        Ok(self.store.query_ordered(&query).await?)
    }

    async fn lowest_items(&self, partition: &PartitionFilter, limit: Option<usize>) -> Result<Vec<RankedRecord>, RankError> {
        let mut query = RankQuery::new(partition.clone(), Direction::Descending);
        query.limit = limit;
        Ok(self.store.query_ordered(&query).await?)
    }

    async fn spread_ranks(&self, partition: &PartitionFilter) -> Result<RankAssignment, RankError> {
        self.spread(partition).await
    }

    async fn spread_all_ranks(&self) -> Result<RankAssignment, RankError> {
        self.spread_collection().await
    }
}
