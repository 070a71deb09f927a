//! HTTP handler definitions for the Quakefeed server.
//!
//! Defines `AppState` (the shared state carried through axum extractors)
//! and re-exports all handler functions for building the router.

pub mod earthquakes;
pub mod health;

pub use earthquakes::{earthquakes_handler, EarthquakePage, EarthquakeParams};
pub use health::{health_handler, liveness_handler, readiness_handler, HealthReport};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::query::QueryEngine;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Paginated query engine with its store and cursor codec.
    pub engine: Arc<QueryEngine>,
    /// Lifecycle state and in-flight query tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
