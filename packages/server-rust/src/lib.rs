//! Quakefeed server: cursor-paginated earthquake queries over day-partitioned
//! storage, served over HTTP.

pub mod config;
pub mod network;
pub mod query;
pub mod storage;

pub use config::{Cli, LogFormat, ServerConfig};
pub use network::NetworkModule;
pub use query::{QueryEngine, QueryError};
pub use storage::{MemoryEventStore, PartitionStore};
