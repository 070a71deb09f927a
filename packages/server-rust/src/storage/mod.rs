//! Storage layer for the Quakefeed server.
//!
//! - [`PartitionStore`]: the range-query contract the query engine depends on
//! - [`MemoryEventStore`]: in-memory, day-partitioned reference implementation
//! - [`StoreConfig`]: over-fetch tuning for partition scans

pub mod config;
pub mod engines;
pub mod partition_store;

pub use config::*;
pub use engines::MemoryEventStore;
pub use partition_store::*;
