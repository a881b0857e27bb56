//! Ports module for ranked lists
//!
//! Defines inbound (API) and outbound (SPI) port traits.

pub mod inbound;
pub mod outbound;

pub use inbound::RankingApi;
pub use outbound::{MonotonicTimeSource, RankQuery, RecordStore, SystemTimeSource, TimeSource};
