//! Storage configuration types.

/// Tuning knobs for the in-memory event store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Raw records read per call, as a multiple of the requested limit,
    /// before the magnitude filter is applied.
    pub over_fetch_multiplier: usize,
    /// Hard ceiling on raw records read in one partition call.
    pub max_scan_per_call: usize,
}

impl StoreConfig {
    /// Number of raw records a call with `limit` may examine. Never zero.
    #[must_use]
    pub fn fetch_cap(&self, limit: usize) -> usize {
        limit
            .saturating_mul(self.over_fetch_multiplier)
            .min(self.max_scan_per_call)
            .max(1)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            over_fetch_multiplier: 3,
            max_scan_per_call: 1000,
        }
    }
}
