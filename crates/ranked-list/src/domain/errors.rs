//! Error types for ranked lists

use super::value_objects::{FieldKind, RecordId};
use thiserror::Error;

/// Setup-time configuration errors. No `RankedList` is built when one occurs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Collection name must not be empty")]
    EmptyCollection,

    #[error("Rank field name must not be empty")]
    EmptyRankField,

    #[error("Rank field `{0}` does not exist")]
    RankFieldMissing(String),

    #[error("Rank field `{field}` has non-numeric type {kind:?}")]
    RankFieldNotNumeric { field: String, kind: FieldKind },

    #[error("Step increment must be a positive finite number, got {0}")]
    InvalidStepIncrement(f64),

    #[error("Step increment {0} is fractional but the rank field stores integers")]
    FractionalStepForIntegerField(f64),

    #[error("Scope column `{0}` is declared more than once")]
    DuplicateScopeColumn(String),

    #[error("Environment variable {var} has invalid value `{value}`")]
    InvalidEnv { var: String, value: String },

    #[error("Schema introspection failed: {0}")]
    Introspection(String),
}

/// Failures reported by the record store collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error("Write rejected for record {id}: {reason}")]
    WriteRejected { id: RecordId, reason: String },

    #[error("Record {0} does not exist")]
    UnknownRecord(RecordId),

    #[error("Record {0} is outside the partition being renumbered")]
    OutsidePartition(RecordId),
}

/// Errors surfaced by ranked list operations.
#[derive(Debug, Error)]
pub enum RankError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// A computed rank left the representable range.
    #[error("Rank overflow while {0}")]
    RankOverflow(&'static str),

    /// Reference record belongs to a different partition.
    #[error("Record {record} and reference {reference} are in different partitions")]
    CrossPartition { record: RecordId, reference: RecordId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::RankFieldNotNumeric {
            field: "rank".to_string(),
            kind: FieldKind::Text,
        };
        assert_eq!(err.to_string(), "Rank field `rank` has non-numeric type Text");
    }

    #[test]
    fn test_persistence_error_converts_transparently() {
        let err: RankError = PersistenceError::UnknownRecord(RecordId(4)).into();
        assert!(matches!(err, RankError::Persistence(_)));
        assert_eq!(err.to_string(), "Record #4 does not exist");
    }

    #[test]
    fn test_cross_partition_display() {
        let err = RankError::CrossPartition {
            record: RecordId(1),
            reference: RecordId(2),
        };
        assert_eq!(
            err.to_string(),
            "Record #1 and reference #2 are in different partitions"
        );
    }
}
