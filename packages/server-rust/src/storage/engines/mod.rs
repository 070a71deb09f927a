//! Concrete [`PartitionStore`](super::PartitionStore) implementations.

pub mod memory;

pub use memory::MemoryEventStore;
