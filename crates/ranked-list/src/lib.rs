//! # Ranked List
//!
//! Order maintenance over a mutable record collection using sparse rank
//! values. Inserting or moving one record rewrites only that record; when
//! two records end up on the same rank the whole partition is renumbered
//! ("spread") in a single bulk write.
//!
//! ## Architecture
//!
//! - **Domain**: Core entities (RankedRecord, RankAssignment) and the exact
//!   fixed-point `Rank`
//! - **Algorithms**: partition resolution, total order, rank allocation,
//!   collision detection, spreading
//! - **Ports**: Inbound (RankingApi) and Outbound (RecordStore, TimeSource)
//! - **Adapters**: In-memory record store
//! - **Application**: Service orchestration
//! - **Context**: task-scoped skip-persistence and avoid-collisions modes
//!
//! ## Consistency
//!
//! Neighbour reads and rank writes are not isolated from each other.
//! Concurrent allocations against the same partition may produce duplicate
//! ranks; the next write that observes the duplicate spreads the partition.
//! Rank uniqueness is eventual, not immediate.
//!
//! ## Example
//!
//! ```no_run
//! use ranked_list::{
//!     InMemoryRecordStore, PartitionDefinition, RankedList, RankedListConfig, RankedRecord,
//!     RankingApi, ScopeSpec,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryRecordStore::new());
//! let list = RankedList::builder(store, RankedListConfig::default())
//!     .partition(PartitionDefinition::new().with(ScopeSpec::relationship("todo_list")))
//!     .build()
//!     .await?;
//!
//! let mut first = RankedRecord::new(1).with_scope("todo_list_id", 7);
//! let mut second = RankedRecord::new(2).with_scope("todo_list_id", 7);
//! list.create(&mut first).await?;
//! list.create(&mut second).await?;
//! list.set_rank_above(&mut second, &first).await?;
//! assert!(list.is_highest(&second).await?);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod context;
pub mod domain;
pub mod ports;
pub mod telemetry;

pub use adapters::InMemoryRecordStore;
pub use algorithms::{PartitionDefinition, PartitionFilter, PartitionKey, ScopeSpec};
pub use application::{RankedList, RankedListBuilder};
pub use config::{RankSettings, RankedListConfig};
pub use context::ExecutionModes;
pub use domain::entities::*;
pub use domain::errors::{ConfigError, PersistenceError, RankError};
pub use domain::value_objects::*;
pub use ports::inbound::RankingApi;
pub use ports::outbound::{MonotonicTimeSource, RankQuery, RecordStore, SystemTimeSource, TimeSource};
pub use telemetry::{init_logging, LogConfig, TelemetryError};
