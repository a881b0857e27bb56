//! Inbound Ports (Driving Ports / API)

use crate::algorithms::partition::PartitionFilter;
use crate::domain::entities::{RankAssignment, RankedRecord};
use crate::domain::errors::RankError;
use crate::domain::value_objects::Rank;
use async_trait::async_trait;

/// Primary ranking API.
///
/// Mutating operations take the record by `&mut` and write the new rank onto
/// it. Unless skip-persistence is active for the collection, the record is
/// then saved, its tiebreak stamped, and a collision check may spread the
/// partition; the record is refreshed with its post-spread rank.
///
/// ## Consistency
///
/// Neighbour reads are not isolated from concurrent writers. Two callers
/// allocating against the same stale neighbours can land on the same rank.
/// The duplicate is resolved by the next write that observes it, so rank
/// uniqueness is eventual, not immediate.
#[async_trait]
pub trait RankingApi: Send + Sync {
    /// Persist a new record, placing it by policy when it carries no rank.
    async fn create(&self, record: &mut RankedRecord) -> Result<(), RankError>;

    /// Persist caller-mutated fields.
    async fn update(&self, record: &mut RankedRecord) -> Result<(), RankError>;

    /// Assign an explicit rank, or `None` to take the record out of the order.
    async fn set_rank(&self, record: &mut RankedRecord, rank: Option<Rank>) -> Result<(), RankError>;

    /// Move `record` directly above `reference`.
    async fn set_rank_above(&self, record: &mut RankedRecord, reference: &RankedRecord) -> Result<(), RankError>;

    /// Move `record` directly below `reference`.
    async fn set_rank_below(&self, record: &mut RankedRecord, reference: &RankedRecord) -> Result<(), RankError>;

    /// Move `record` between `upper` and `lower`.
    async fn set_rank_between(
        &self,
        record: &mut RankedRecord,
        upper: &RankedRecord,
        lower: &RankedRecord,
    ) -> Result<(), RankError>;

    /// Exchange the ranks of two records of one partition.
    async fn swap_rank_with(&self, a: &mut RankedRecord, b: &mut RankedRecord) -> Result<(), RankError>;

    /// Move `record` `count` places toward the top.
    async fn increase_rank(&self, record: &mut RankedRecord, count: usize) -> Result<(), RankError>;

    /// Move `record` `count` places toward the bottom.
    async fn decrease_rank(&self, record: &mut RankedRecord, count: usize) -> Result<(), RankError>;

    /// True when `record` is first in its partition.
    async fn is_highest(&self, record: &RankedRecord) -> Result<bool, RankError>;

    /// True when `record` is last in its partition.
    async fn is_lowest(&self, record: &RankedRecord) -> Result<bool, RankError>;

    /// Records ordered before `record`, nearest first.
    async fn higher_items(&self, record: &RankedRecord, limit: Option<usize>) -> Result<Vec<RankedRecord>, RankError>;

    /// Records ordered after `record`, nearest first.
    async fn lower_items(&self, record: &RankedRecord, limit: Option<usize>) -> Result<Vec<RankedRecord>, RankError>;

    /// First `limit` ranked records of a partition, top first.
    async fn highest_items(&self, partition: &PartitionFilter, limit: Option<usize>) -> Result<Vec<RankedRecord>, RankError>;

    /// Last `limit` ranked records of a partition, bottom first.
    async fn lowest_items(&self, partition: &PartitionFilter, limit: Option<usize>) -> Result<Vec<RankedRecord>, RankError>;

    /// Renumber one partition to multiples of the step increment.
    async fn spread_ranks(&self, partition: &PartitionFilter) -> Result<RankAssignment, RankError>;

    /// Renumber every partition of the collection in one bulk write.
    async fn spread_all_ranks(&self) -> Result<RankAssignment, RankError>;
}
