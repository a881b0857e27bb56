//! Spreader
//!
//! Renumbers ranked records to `position * step`, positions starting at 1 in
//! the total order. Unranked records are left out of the assignment. Planning
//! is pure; the bulk write belongs to the record store.

use super::ordering::compare;
use super::partition::{PartitionFilter, PartitionKey, PartitionResolver};
use crate::domain::entities::{RankAssignment, RankedRecord};
use crate::domain::errors::RankError;
use crate::domain::value_objects::Rank;
use std::collections::BTreeMap;

/// Evenly spaced assignment for the ranked records of one partition.
pub fn plan_spread(
    filter: &PartitionFilter,
    records: &[RankedRecord],
    step: Rank,
) -> Result<RankAssignment, RankError> {
    let mut ranked: Vec<&RankedRecord> = records
        .iter()
        .filter(|record| record.is_ranked() && filter.matches(record))
        .collect();
    ranked.sort_by(|a, b| compare(filter, a, b));

    let mut entries = Vec::with_capacity(ranked.len());
    for (position, record) in (1u64..).zip(ranked) {
        let rank = step
            .checked_mul(position)
            .ok_or(RankError::RankOverflow("spreading ranks"))?;
        entries.push((record.id, rank));
    }

    Ok(RankAssignment {
        entries,
        touch: None,
    })
}

/// Assignment renumbering every partition of a collection independently.
pub fn plan_collection_spread(
    resolver: &PartitionResolver,
    records: &[RankedRecord],
    step: Rank,
) -> Result<RankAssignment, RankError> {
    let collection = resolver.collection();
    let mut partitions: BTreeMap<PartitionKey, Vec<RankedRecord>> = BTreeMap::new();
    for record in records
        .iter()
        .filter(|record| record.is_ranked() && collection.matches(record))
    {
        partitions
            .entry(resolver.key_of(record))
            .or_default()
            .push(record.clone());
    }

    let mut assignment = RankAssignment::default();
    for members in partitions.values() {
        let Some(anchor) = members.first() else {
            continue;
        };
        let filter = resolver.resolve(anchor);
        assignment
            .entries
            .extend(plan_spread(&filter, members, step)?.entries);
    }
    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::partition::{PartitionDefinition, ScopeSpec};
    use crate::domain::value_objects::RecordId;
    use proptest::prelude::*;

    fn step() -> Rank {
        Rank::from(1024)
    }

    fn unscoped() -> PartitionResolver {
        PartitionResolver::new(&PartitionDefinition::new()).unwrap()
    }

    fn apply_assignment(records: &mut [RankedRecord], assignment: &RankAssignment) {
        for record in records.iter_mut() {
            if let Some(rank) = assignment.rank_of(record.id) {
                record.set_rank(Some(rank));
                record.mark_persisted();
            }
        }
    }

    #[test]
    fn test_spread_breaks_ties_by_tiebreak() {
        let resolver = unscoped();
        let records: Vec<_> = [40u64, 10, 30, 20]
            .iter()
            .enumerate()
            .map(|(i, t)| RankedRecord::new(i as u64 + 1).with_rank(42).with_tiebreak(*t))
            .collect();

        let assignment = plan_spread(&resolver.collection(), &records, step()).unwrap();
        assert_eq!(
            assignment.entries,
            vec![
                (RecordId(2), Rank::from(1024)),
                (RecordId(4), Rank::from(2048)),
                (RecordId(3), Rank::from(3072)),
                (RecordId(1), Rank::from(4096)),
            ]
        );
    }

    #[test]
    fn test_spread_skips_unranked() {
        let resolver = unscoped();
        let records = vec![
            RankedRecord::new(1),
            RankedRecord::new(2).with_rank(5),
            RankedRecord::new(3),
        ];

        let assignment = plan_spread(&resolver.collection(), &records, step()).unwrap();
        assert_eq!(assignment.entries, vec![(RecordId(2), Rank::from(1024))]);
    }

    #[test]
    fn test_spread_respects_partition() {
        let definition = PartitionDefinition::new().with(ScopeSpec::relationship("list"));
        let resolver = PartitionResolver::new(&definition).unwrap();
        let records = vec![
            RankedRecord::new(1).with_rank(1).with_scope("list", 1),
            RankedRecord::new(2).with_rank(2).with_scope("list", 2),
            RankedRecord::new(3).with_rank(3).with_scope("list", 1),
        ];

        let filter = resolver.resolve(&records[0]);
        let assignment = plan_spread(&filter, &records, step()).unwrap();
        assert_eq!(
            assignment.entries,
            vec![(RecordId(1), Rank::from(1024)), (RecordId(3), Rank::from(2048))]
        );
    }

    #[test]
    fn test_collection_spread_numbers_partitions_independently() {
        let definition = PartitionDefinition::new().with(ScopeSpec::named_group("day"));
        let resolver = PartitionResolver::new(&definition).unwrap();
        let records: Vec<_> = (0..4)
            .map(|i| {
                RankedRecord::new(i as u64)
                    .with_rank(i)
                    .with_scope("day", i % 2)
            })
            .collect();

        let assignment = plan_collection_spread(&resolver, &records, step()).unwrap();
        assert_eq!(assignment.rank_of(RecordId(0)), Some(Rank::from(1024)));
        assert_eq!(assignment.rank_of(RecordId(2)), Some(Rank::from(2048)));
        assert_eq!(assignment.rank_of(RecordId(1)), Some(Rank::from(1024)));
        assert_eq!(assignment.rank_of(RecordId(3)), Some(Rank::from(2048)));
    }

    #[test]
    fn test_spread_overflow_is_reported() {
        let resolver = unscoped();
        let records = vec![RankedRecord::new(1).with_rank(1), RankedRecord::new(2).with_rank(2)];
        let step = Rank::from_integer(Rank::MAX_INTEGER).unwrap();

        assert!(matches!(
            plan_spread(&resolver.collection(), &records, step),
            Err(RankError::RankOverflow(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_spread_is_idempotent(
            entries in proptest::collection::vec((proptest::option::of(0i32..50), 0u64..5), 0..30)
        ) {
            let resolver = unscoped();
            let filter = resolver.collection();
            let mut records: Vec<_> = entries
                .iter()
                .enumerate()
                .map(|(i, (rank, tiebreak))| {
                    let record = RankedRecord::new(i as u64).with_tiebreak(*tiebreak);
                    match rank {
                        Some(rank) => record.with_rank(*rank),
                        None => record,
                    }
                })
                .collect();

            let first = plan_spread(&filter, &records, step()).unwrap();
            apply_assignment(&mut records, &first);
            let second = plan_spread(&filter, &records, step()).unwrap();

            prop_assert_eq!(&first, &second);
            let unranked = entries.iter().filter(|(rank, _)| rank.is_none()).count();
            prop_assert_eq!(first.len() + unranked, records.len());
        }
    }
}
