//! Domain value types shared by the cursor codec, the query engine, and the
//! HTTP layer.
//!
//! All instants are [`EpochMillis`]: signed milliseconds since the Unix epoch,
//! interpreted as UTC. Textual timestamp formats are the HTTP layer's concern.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Milliseconds since the Unix epoch (UTC).
pub type EpochMillis = i64;

/// Milliseconds in one day.
pub const DAY_MILLIS: EpochMillis = 86_400_000;

/// Longest time window a single query may span.
pub const MAX_WINDOW_MILLIS: EpochMillis = 365 * DAY_MILLIS;

/// Smallest accepted page size. Smaller requested values are clamped up.
pub const MIN_PAGE_SIZE: u32 = 1;

/// Largest accepted page size. Larger requested values are clamped down.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page size used when the caller does not supply one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Lowest accepted magnitude floor.
pub const MIN_MAGNITUDE: f64 = -2.0;

/// Highest accepted magnitude floor.
pub const MAX_MAGNITUDE: f64 = 10.0;

/// A single seismic event record as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarthquakeEvent {
    /// Source-assigned unique identifier.
    pub event_id: String,
    /// Origin time of the event.
    pub event_time: EpochMillis,
    /// Reported magnitude.
    pub magnitude: f64,
    /// Epicenter latitude in degrees.
    pub latitude: f64,
    /// Epicenter longitude in degrees.
    pub longitude: f64,
    /// Hypocenter depth in kilometres, when reported.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub depth_km: Option<f64>,
    /// Human-readable location description, when reported.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub place: Option<String>,
}

impl EarthquakeEvent {
    /// Total order used for every result page: most recent first, ties
    /// broken by ascending event id.
    #[must_use]
    pub fn page_order(a: &Self, b: &Self) -> Ordering {
        b.event_time
            .cmp(&a.event_time)
            .then_with(|| a.event_id.cmp(&b.event_id))
    }
}

/// Sorts events into page order in place.
pub fn sort_page(items: &mut [EarthquakeEvent]) {
    items.sort_by(EarthquakeEvent::page_order);
}

/// Inclusive time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Window start (inclusive).
    pub start: EpochMillis,
    /// Window end (inclusive).
    pub end: EpochMillis,
}

impl TimeRange {
    /// Creates the window `[start, end]`.
    #[must_use]
    pub fn new(start: EpochMillis, end: EpochMillis) -> Self {
        Self { start, end }
    }

    /// Whether `instant` falls inside the window.
    #[must_use]
    pub fn contains(&self, instant: EpochMillis) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Rejected query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid request: {0}")]
pub struct InvalidRequest(pub String);

/// A paginated query as presented by a caller.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Window start (inclusive).
    pub start_time: EpochMillis,
    /// Window end (inclusive).
    pub end_time: EpochMillis,
    /// Only events with `magnitude >= min_magnitude` match.
    pub min_magnitude: f64,
    /// Requested page size; clamped by [`QueryRequest::validate`].
    pub page_size: u32,
    /// Signed continuation token from a previous page.
    pub cursor: Option<String>,
}

impl QueryRequest {
    /// Creates a first-page request with no cursor.
    #[must_use]
    pub fn new(
        start_time: EpochMillis,
        end_time: EpochMillis,
        min_magnitude: f64,
        page_size: u32,
    ) -> Self {
        Self {
            start_time,
            end_time,
            min_magnitude,
            page_size,
            cursor: None,
        }
    }

    /// Attaches a continuation token.
    #[must_use]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// The request's time window.
    #[must_use]
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    /// Checks the window and magnitude bounds and clamps the page size.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequest`] when the window is inverted, longer than
    /// 365 days, or has an end with no calendar date, or when the magnitude
    /// floor is outside `[-2.0, 10.0]`.
    pub fn validate(mut self) -> Result<Self, InvalidRequest> {
        if self.start_time > self.end_time {
            return Err(InvalidRequest(
                "startTime must not be after endTime".to_string(),
            ));
        }
        for (name, instant) in [("startTime", self.start_time), ("endTime", self.end_time)] {
            if DateTime::<Utc>::from_timestamp_millis(instant).is_none() {
                return Err(InvalidRequest(format!(
                    "{name} is outside the supported calendar range"
                )));
            }
        }
        if self.end_time.saturating_sub(self.start_time) > MAX_WINDOW_MILLIS {
            return Err(InvalidRequest(
                "time window must not exceed 365 days".to_string(),
            ));
        }
        if !self.min_magnitude.is_finite()
            || !(MIN_MAGNITUDE..=MAX_MAGNITUDE).contains(&self.min_magnitude)
        {
            return Err(InvalidRequest(format!(
                "minMagnitude must be within [{MIN_MAGNITUDE}, {MAX_MAGNITUDE}]"
            )));
        }
        self.page_size = self.page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        Ok(self)
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Events in page order, at most `page_size` of them.
    pub items: Vec<EarthquakeEvent>,
    /// Token for the next page; `None` once the window is exhausted.
    pub next_cursor: Option<String>,
    /// Number of partition queries issued for this page.
    pub buckets_scanned: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn event(id: &str, time: EpochMillis) -> EarthquakeEvent {
        EarthquakeEvent {
            event_id: id.to_string(),
            event_time: time,
            magnitude: 3.0,
            latitude: 0.0,
            longitude: 0.0,
            depth_km: None,
            place: None,
        }
    }

    #[test]
    fn page_order_is_time_desc_then_id_asc() {
        let mut items = vec![
            event("b", 10),
            event("a", 10),
            event("c", 30),
            event("d", 20),
        ];
        sort_page(&mut items);
        let ids: Vec<&str> = items.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d", "a", "b"]);
    }

    #[test]
    fn validate_clamps_page_size() {
        let low = QueryRequest::new(0, 10, 2.0, 0).validate().unwrap();
        assert_eq!(low.page_size, 1);
        let high = QueryRequest::new(0, 10, 2.0, 5000).validate().unwrap();
        assert_eq!(high.page_size, 100);
        let mid = QueryRequest::new(0, 10, 2.0, 42).validate().unwrap();
        assert_eq!(mid.page_size, 42);
    }

    #[test]
    fn validate_rejects_inverted_window() {
        let err = QueryRequest::new(10, 0, 2.0, 10).validate().unwrap_err();
        assert!(err.0.contains("startTime"));
    }

    #[test]
    fn validate_window_limit_is_inclusive() {
        assert!(QueryRequest::new(0, MAX_WINDOW_MILLIS, 2.0, 10)
            .validate()
            .is_ok());
        assert!(QueryRequest::new(0, MAX_WINDOW_MILLIS + 1, 2.0, 10)
            .validate()
            .is_err());
    }

    #[test]
    fn validate_magnitude_bounds() {
        assert!(QueryRequest::new(0, 1, -2.0, 10).validate().is_ok());
        assert!(QueryRequest::new(0, 1, 10.0, 10).validate().is_ok());
        assert!(QueryRequest::new(0, 1, -2.1, 10).validate().is_err());
        assert!(QueryRequest::new(0, 1, 10.5, 10).validate().is_err());
        assert!(QueryRequest::new(0, 1, f64::NAN, 10).validate().is_err());
    }

    #[test]
    fn validate_rejects_instants_without_a_calendar_date() {
        let err = QueryRequest::new(i64::MAX - 1000, i64::MAX, 2.0, 10)
            .validate()
            .unwrap_err();
        assert!(err.0.contains("startTime"));

        let err = QueryRequest::new(i64::MIN, i64::MIN + 1000, 2.0, 10)
            .validate()
            .unwrap_err();
        assert!(err.0.contains("calendar range"));
    }

    #[test]
    fn validated_window_always_has_buckets() {
        let request = QueryRequest::new(-1, 0, 2.0, 10).validate().unwrap();
        let buckets = crate::bucket::enumerate_day_buckets(request.start_time, request.end_time);
        assert_eq!(buckets, vec!["19691231", "19700101"]);
    }

    #[test]
    fn time_range_contains_is_inclusive() {
        let range = TimeRange::new(5, 10);
        assert!(range.contains(5));
        assert!(range.contains(10));
        assert!(!range.contains(4));
        assert!(!range.contains(11));
    }

    proptest! {
        #[test]
        fn sorted_pages_are_strictly_ordered(
            raw in prop::collection::hash_map("[a-z0-9]{1,6}", 0_i64..20, 0..40),
        ) {
            let mut items: Vec<EarthquakeEvent> =
                raw.iter().map(|(id, time)| event(id, *time)).collect();
            sort_page(&mut items);

            prop_assert_eq!(items.len(), raw.len());
            for pair in items.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(
                    a.event_time > b.event_time
                        || (a.event_time == b.event_time && a.event_id < b.event_id)
                );
            }
        }
    }

    #[test]
    fn event_serializes_camel_case_and_skips_absent_fields() {
        let json = serde_json::to_value(event("us7000abcd", 1_700_000_000_000)).unwrap();
        assert_eq!(json["eventId"], "us7000abcd");
        assert_eq!(json["eventTime"], 1_700_000_000_000_i64);
        assert!(json.get("depthKm").is_none());
        assert!(json.get("place").is_none());
    }
}
