//! Total order over ranked records
//!
//! `(group prefix, rank, tiebreak, id)` ascending. Descending is the exact
//! reverse. Unranked records sort after every ranked one but never reach
//! ordering queries in practice.

use super::partition::PartitionFilter;
use crate::domain::entities::RankedRecord;
use crate::domain::value_objects::Direction;
use std::cmp::Ordering;

/// Ascending comparison of two records under `filter`'s sort prefix.
pub fn compare(filter: &PartitionFilter, a: &RankedRecord, b: &RankedRecord) -> Ordering {
    filter
        .sort_prefix(a)
        .cmp(&filter.sort_prefix(b))
        .then_with(|| compare_rank(a, b))
        .then_with(|| a.tiebreak.cmp(&b.tiebreak))
        .then_with(|| a.id.cmp(&b.id))
}

fn compare_rank(a: &RankedRecord, b: &RankedRecord) -> Ordering {
    match (a.current_rank(), b.current_rank()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort in place in the requested direction.
pub fn sort_records(filter: &PartitionFilter, records: &mut [RankedRecord], direction: Direction) {
    records.sort_by(|a, b| direction.apply(compare(filter, a, b)));
}
