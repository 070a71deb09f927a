//! Paginated earthquake queries over day-partitioned storage.

pub mod engine;
pub mod error;

pub use engine::QueryEngine;
pub use error::QueryError;
