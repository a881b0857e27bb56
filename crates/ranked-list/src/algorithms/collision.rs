//! Collision Detector
//!
//! A collision is two records of one partition holding exactly the same
//! rank. Detection runs after the record has been written, so the holder
//! count includes the record itself.

use crate::domain::entities::RankedRecord;
use crate::domain::value_objects::Rank;

/// Rank to check for `record`, or `None` when no check is due.
///
/// A check is due only when collision avoidance is on, the rank was assigned
/// in this operation, and the record is ranked.
pub fn collision_candidate(record: &RankedRecord, avoid_collisions: bool) -> Option<Rank> {
    if !avoid_collisions || !record.rank_changed() {
        return None;
    }
    record.current_rank()
}

/// True when `holders` records (the written one included) share a rank.
pub fn is_collision(holders: usize) -> bool {
    holders > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_requires_changed_rank() {
        let mut record = RankedRecord::new(1).with_rank(100);
        assert_eq!(collision_candidate(&record, true), Some(Rank::from(100)));

        record.mark_persisted();
        assert_eq!(collision_candidate(&record, true), None);
    }

    #[test]
    fn test_candidate_respects_mode() {
        let record = RankedRecord::new(1).with_rank(100);
        assert_eq!(collision_candidate(&record, false), None);
    }

    #[test]
    fn test_unranked_record_never_collides() {
        let mut record = RankedRecord::new(1);
        record.set_rank(None);
        assert_eq!(collision_candidate(&record, true), None);
    }

    #[test]
    fn test_holder_count_includes_self() {
        assert!(!is_collision(0));
        assert!(!is_collision(1));
        assert!(is_collision(2));
    }
}
