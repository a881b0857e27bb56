//! Core entities for ranked lists

use super::value_objects::{FieldValue, Rank, RecordId, Timestamp};
use std::collections::BTreeMap;

/// A record taking part in a ranked collection.
///
/// The record owns its rank. `rank = None` means the record is deliberately
/// outside the ordered sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankedRecord {
    /// Stable identity within the collection
    pub id: RecordId,
    rank: Option<Rank>,
    /// Values of the columns that partition definitions read
    pub scope_values: BTreeMap<String, FieldValue>,
    /// Secondary ordering key for equal ranks (an "updated at" stamp)
    pub tiebreak: Timestamp,
    rank_changed: bool,
}

impl RankedRecord {
    pub fn new(id: u64) -> Self {
        Self {
            id: RecordId(id),
            rank: None,
            scope_values: BTreeMap::new(),
            tiebreak: 0,
            rank_changed: false,
        }
    }

    pub fn with_rank(mut self, rank: impl Into<Rank>) -> Self {
        self.set_rank(Some(rank.into()));
        self
    }

    pub fn with_scope(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.scope_values.insert(column.into(), value.into());
        self
    }

    pub fn with_tiebreak(mut self, tiebreak: Timestamp) -> Self {
        self.tiebreak = tiebreak;
        self
    }

    pub fn current_rank(&self) -> Option<Rank> {
        self.rank
    }

    pub fn is_ranked(&self) -> bool {
        self.rank.is_some()
    }

    /// Assign a rank and mark it dirty for the next persist.
    pub fn set_rank(&mut self, rank: Option<Rank>) {
        self.rank = rank;
        self.rank_changed = true;
    }

    /// True when the rank was assigned since the record was last persisted.
    pub fn rank_changed(&self) -> bool {
        self.rank_changed
    }

    /// Clear the dirty flag after a successful persist.
    pub fn mark_persisted(&mut self) {
        self.rank_changed = false;
    }

    /// Value of a scope column; absent columns read as `Null`.
    pub fn scope_value(&self, column: &str) -> Option<&FieldValue> {
        self.scope_values.get(column)
    }

    pub(crate) fn restore_rank(&mut self, rank: Option<Rank>, rank_changed: bool) {
        self.rank = rank;
        self.rank_changed = rank_changed;
    }

    /// Stored copies never carry a dirty flag.
    pub(crate) fn into_persisted(mut self) -> Self {
        self.rank_changed = false;
        self
    }
}

/// Full rank reassignment applied by one bulk renumbering write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RankAssignment {
    /// New rank per record, in list order
    pub entries: Vec<(RecordId, Rank)>,
    /// Tiebreak stamp written alongside the ranks, when touching is enabled
    pub touch: Option<Timestamp>,
}

impl RankAssignment {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rank_of(&self, id: RecordId) -> Option<Rank> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == id)
            .map(|(_, rank)| *rank)
    }

    pub fn with_touch(mut self, touch: Option<Timestamp>) -> Self {
        self.touch = touch;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_unranked_and_clean() {
        let record = RankedRecord::new(1);
        assert!(!record.is_ranked());
        assert!(!record.rank_changed());
    }

    #[test]
    fn test_set_rank_marks_dirty_until_persisted() {
        let mut record = RankedRecord::new(1);
        record.set_rank(Some(Rank::from(20)));
        assert_eq!(record.current_rank(), Some(Rank::from(20)));
        assert!(record.rank_changed());

        record.mark_persisted();
        assert!(!record.rank_changed());
    }

    #[test]
    fn test_builder_sets_scope_values() {
        let record = RankedRecord::new(7)
            .with_scope("todo_list_id", 3)
            .with_scope("kind", "work")
            .with_tiebreak(99);

        assert_eq!(record.scope_value("todo_list_id"), Some(&FieldValue::Int(3)));
        assert_eq!(record.scope_value("kind"), Some(&FieldValue::from("work")));
        assert_eq!(record.scope_value("missing"), None);
        assert_eq!(record.tiebreak, 99);
    }
}
