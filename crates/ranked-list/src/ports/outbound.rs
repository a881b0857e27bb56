//! Outbound Ports (Driven Ports / SPI)
//!
//! These are the interfaces the host application implements: the record
//! store holding ranked records, and a clock for tiebreak stamps.

use crate::algorithms::ordering::compare;
use crate::algorithms::partition::PartitionFilter;
use crate::domain::entities::{RankAssignment, RankedRecord};
use crate::domain::errors::PersistenceError;
use crate::domain::value_objects::{Direction, FieldKind, Rank, RankBound, RecordId, Timestamp};
use async_trait::async_trait;
use std::cmp::Ordering;

/// Ordered read over one partition (or a whole collection).
///
/// Stores must return only ranked records admitted by `filter`, sorted with
/// [`crate::algorithms::ordering::compare`] in `direction`.
#[derive(Clone, Debug)]
pub struct RankQuery {
    pub filter: PartitionFilter,
    pub direction: Direction,
    /// Maximum records returned; `None` for all
    pub limit: Option<usize>,
    /// Restrict to ranks satisfying this bound
    pub bound: Option<RankBound>,
    /// Leave this record out of the result
    pub exclude: Option<RecordId>,
    /// Keep only the first record of each distinct rank
    pub distinct_ranks: bool,
    /// Keep only records that come strictly after this one in `direction`
    pub after: Option<RankedRecord>,
}

impl RankQuery {
    pub fn new(filter: PartitionFilter, direction: Direction) -> Self {
        Self {
            filter,
            direction,
            limit: None,
            bound: None,
            exclude: None,
            distinct_ranks: false,
            after: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn bound(mut self, bound: RankBound) -> Self {
        self.bound = Some(bound);
        self
    }

    pub fn excluding(mut self, id: RecordId) -> Self {
        self.exclude = Some(id);
        self
    }

    pub fn distinct_ranks(mut self) -> Self {
        self.distinct_ranks = true;
        self
    }

    pub fn after(mut self, anchor: &RankedRecord) -> Self {
        self.after = Some(anchor.clone());
        self
    }

    /// Candidate test applied before ordering and limiting.
    pub fn admits(&self, record: &RankedRecord) -> bool {
        let Some(rank) = record.current_rank() else {
            return false;
        };
        self.exclude != Some(record.id)
            && self.bound.map_or(true, |bound| bound.admits(rank))
            && self.filter.matches(record)
            && self.after.as_ref().map_or(true, |anchor| {
                self.direction.apply(compare(&self.filter, record, anchor)) == Ordering::Greater
            })
    }
}

/// Record store collaborator.
///
/// Production: a database table behind the host application's persistence layer.
/// Testing: [`crate::adapters::InMemoryRecordStore`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Storage type of `field`, or `None` when the field does not exist.
    async fn describe_field(&self, field: &str) -> Result<Option<FieldKind>, PersistenceError>;

    /// Ranked records matching `query`, ordered and capped.
    async fn query_ordered(&self, query: &RankQuery) -> Result<Vec<RankedRecord>, PersistenceError>;

    /// Number of records in `filter` holding exactly `rank`.
    async fn count_with_rank(&self, filter: &PartitionFilter, rank: Rank) -> Result<usize, PersistenceError>;

    /// Apply a full rank reassignment.
    ///
    /// ## Atomicity Guarantee
    ///
    /// Either every entry is written, or none is. Every entry must name a
    /// record admitted by `filter`. When `assignment.touch` is set, the
    /// tiebreak of each renumbered record is overwritten with it.
    async fn bulk_renumber(
        &self,
        filter: &PartitionFilter,
        assignment: &RankAssignment,
    ) -> Result<(), PersistenceError>;

    /// Insert or replace a record.
    async fn save(&self, record: &RankedRecord) -> Result<(), PersistenceError>;

    /// Current stored copy of a record.
    async fn fetch(&self, id: RecordId) -> Result<Option<RankedRecord>, PersistenceError>;
}

/// Clock used for tiebreak stamps.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock, milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as Timestamp)
            .unwrap_or(0)
    }
}

/// Deterministic clock that advances by one tick on every read.
#[derive(Debug, Default)]
pub struct MonotonicTimeSource {
    next: std::sync::atomic::AtomicU64,
}

impl MonotonicTimeSource {
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            next: std::sync::atomic::AtomicU64::new(start),
        }
    }
}

impl TimeSource for MonotonicTimeSource {
    fn now(&self) -> Timestamp {
        self.next.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}
