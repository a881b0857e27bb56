//! Domain invariants for ranked lists

use super::entities::RankedRecord;
use super::value_objects::{Direction, Rank, RecordId};
use crate::algorithms::ordering::compare;
use crate::algorithms::partition::PartitionFilter;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// INVARIANT-1: Ordering totality
/// Query output is strictly sorted by `(group, rank, tiebreak, id)` and
/// contains no unranked record.
pub fn invariant_ordered(records: &[RankedRecord], filter: &PartitionFilter, direction: Direction) -> bool {
    records.iter().all(RankedRecord::is_ranked)
        && records
            .windows(2)
            .all(|pair| direction.apply(compare(filter, &pair[0], &pair[1])) == Ordering::Less)
}

/// INVARIANT-2: Unique ranks
/// No two ranked records share a rank.
pub fn invariant_unique_ranks(records: &[RankedRecord]) -> bool {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(RankedRecord::current_rank)
        .all(|rank| seen.insert(rank))
}

/// INVARIANT-3: Even spacing
/// After a spread the ranked records hold exactly `step, 2*step, ...`.
pub fn invariant_evenly_spaced(records: &[RankedRecord], step: Rank) -> bool {
    let mut ranks: Vec<Rank> = records.iter().filter_map(RankedRecord::current_rank).collect();
    ranks.sort();
    ranks
        .iter()
        .zip(1u64..)
        .all(|(rank, position)| step.checked_mul(position) == Some(*rank))
}

/// INVARIANT-4: Unranked exclusion
/// Records unranked before an operation are still unranked, and untouched,
/// after it.
pub fn invariant_unranked_untouched(before: &[RankedRecord], after: &[RankedRecord]) -> bool {
    let after: HashMap<RecordId, &RankedRecord> = after.iter().map(|r| (r.id, r)).collect();
    before
        .iter()
        .filter(|record| !record.is_ranked())
        .all(|record| match after.get(&record.id) {
            Some(now) => !now.is_ranked() && now.tiebreak == record.tiebreak,
            None => false,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::partition::{PartitionDefinition, PartitionResolver};

    fn filter() -> PartitionFilter {
        PartitionResolver::new(&PartitionDefinition::new())
            .unwrap()
            .collection()
    }

    #[test]
    fn test_invariant_ordered_valid() {
        let records = vec![
            RankedRecord::new(1).with_rank(10),
            RankedRecord::new(2).with_rank(20),
        ];
        assert!(invariant_ordered(&records, &filter(), Direction::Ascending));
        assert!(!invariant_ordered(&records, &filter(), Direction::Descending));
    }

    #[test]
    fn test_invariant_ordered_rejects_unranked() {
        let records = vec![RankedRecord::new(1).with_rank(10), RankedRecord::new(2)];
        assert!(!invariant_ordered(&records, &filter(), Direction::Ascending));
    }

    #[test]
    fn test_invariant_unique_ranks() {
        let unique = vec![RankedRecord::new(1).with_rank(1), RankedRecord::new(2).with_rank(2)];
        let clashing = vec![RankedRecord::new(1).with_rank(1), RankedRecord::new(2).with_rank(1)];
        assert!(invariant_unique_ranks(&unique));
        assert!(!invariant_unique_ranks(&clashing));
    }

    #[test]
    fn test_invariant_evenly_spaced() {
        let step = Rank::from(1024);
        let spaced = vec![
            RankedRecord::new(1).with_rank(2048),
            RankedRecord::new(2).with_rank(1024),
            RankedRecord::new(3),
        ];
        let gapped = vec![RankedRecord::new(1).with_rank(1024), RankedRecord::new(2).with_rank(4096)];
        assert!(invariant_evenly_spaced(&spaced, step));
        assert!(!invariant_evenly_spaced(&gapped, step));
    }

    #[test]
    fn test_invariant_unranked_untouched() {
        let before = vec![RankedRecord::new(1).with_tiebreak(5), RankedRecord::new(2).with_rank(3)];
        let same = before.clone();
        let touched = vec![RankedRecord::new(1).with_tiebreak(6), RankedRecord::new(2).with_rank(3)];
        assert!(invariant_unranked_untouched(&before, &same));
        assert!(!invariant_unranked_untouched(&before, &touched));
    }
}
