//! Day-granularity partition keys.
//!
//! Events are sharded by the UTC calendar day of their origin time. A bucket
//! key is the zero-padded `YYYYMMDD` form of that day, so lexicographic and
//! chronological order agree.
//!
//! - [`day_bucket`]: bucket key for a single instant
//! - [`enumerate_day_buckets`]: every bucket a time window overlaps

use chrono::{DateTime, NaiveDate, Utc};

use crate::types::EpochMillis;

const BUCKET_FORMAT: &str = "%Y%m%d";

/// UTC calendar day of an instant, or `None` when the instant is outside the
/// representable calendar range.
fn utc_day(instant: EpochMillis) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(instant).map(|dt| dt.date_naive())
}

fn format_bucket(day: NaiveDate) -> String {
    day.format(BUCKET_FORMAT).to_string()
}

/// Returns the bucket key of the UTC day containing `instant`.
///
/// # Examples
///
/// ```
/// use quakefeed_core::bucket::day_bucket;
///
/// // 2024-02-29T23:59:59.999Z
/// assert_eq!(day_bucket(1_709_251_199_999).as_deref(), Some("20240229"));
/// ```
#[must_use]
pub fn day_bucket(instant: EpochMillis) -> Option<String> {
    utc_day(instant).map(format_bucket)
}

/// Lists the bucket keys of every UTC day from `start`'s day through `end`'s
/// day, inclusive, in ascending order.
///
/// Ordering of the arguments is the caller's responsibility: an inverted
/// window yields an empty list, as does an instant outside the calendar range.
///
/// # Examples
///
/// ```
/// use quakefeed_core::bucket::enumerate_day_buckets;
///
/// // 2024-12-30T00:00Z .. 2025-01-02T00:00Z
/// let buckets = enumerate_day_buckets(1_735_516_800_000, 1_735_776_000_000);
/// assert_eq!(buckets, vec!["20241230", "20241231", "20250101", "20250102"]);
/// ```
#[must_use]
pub fn enumerate_day_buckets(start: EpochMillis, end: EpochMillis) -> Vec<String> {
    let (Some(first), Some(last)) = (utc_day(start), utc_day(end)) else {
        return Vec::new();
    };

    let mut buckets = Vec::new();
    let mut day = Some(first);
    while let Some(current) = day {
        if current > last {
            break;
        }
        buckets.push(format_bucket(current));
        day = current.succ_opt();
    }
    buckets
}
