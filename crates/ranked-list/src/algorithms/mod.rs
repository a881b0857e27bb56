//! Algorithms module for ranked lists
//!
//! Contains:
//! - Partition key resolution
//! - The record total order
//! - Rank allocation
//! - Collision detection
//! - Spreading (renumbering)

pub mod allocator;
pub mod collision;
pub mod ordering;
pub mod partition;
pub mod spreader;

pub use ordering::{compare, sort_records};
pub use partition::{
    PartitionDefinition, PartitionFilter, PartitionKey, PartitionResolver, ScopePredicate,
    ScopeSpec,
};
pub use spreader::{plan_collection_spread, plan_spread};
