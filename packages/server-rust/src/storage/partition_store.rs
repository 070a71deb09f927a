//! Per-partition range query contract for the event store.
//!
//! Defines [`PartitionStore`], the only storage capability the query engine
//! needs: scan one day bucket for events in a time window above a magnitude
//! floor, resuming from an opaque [`ContinuationKey`].

use async_trait::async_trait;
use quakefeed_core::{ContinuationKey, EarthquakeEvent, TimeRange};

/// Arguments of a single partition scan.
#[derive(Debug, Clone)]
pub struct PartitionQuery {
    /// Day bucket key (`YYYYMMDD`) to scan.
    pub bucket: String,
    /// Only events whose time falls in this window match.
    pub time_range: TimeRange,
    /// Only events with `magnitude >= min_magnitude` match.
    pub min_magnitude: f64,
    /// Maximum number of matching events to return.
    pub limit: usize,
    /// Where a previous scan of this bucket stopped; `None` scans from the start.
    pub continuation: Option<ContinuationKey>,
}

/// Result of a single partition scan.
#[derive(Debug, Clone, Default)]
pub struct PartitionPage {
    /// Matching events, at most `limit` of them.
    pub items: Vec<EarthquakeEvent>,
    /// Set whenever the partition holds unscanned records in the window.
    pub continuation: Option<ContinuationKey>,
}

impl PartitionPage {
    /// A page with no items and nothing left to scan.
    #[must_use]
    pub fn exhausted() -> Self {
        Self::default()
    }
}

/// Range-query access to the day-partitioned event store.
///
/// Implementations may read more raw records than `limit` before applying
/// the magnitude filter, but must never return more than `limit` matching
/// events, and must return a continuation key whenever records remain
/// beyond what was scanned. Because of that internal read cap, a page with
/// fewer than `limit` items can still carry a continuation key.
///
/// Used as `Arc<dyn PartitionStore>`; must tolerate concurrent calls.
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Scans one partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store is unreachable or the
    /// continuation key does not belong to this partition.
    async fn query_partition(&self, query: &PartitionQuery) -> anyhow::Result<PartitionPage>;
}
