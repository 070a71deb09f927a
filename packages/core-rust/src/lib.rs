//! Quakefeed core: earthquake event types, day-bucket partitioning, and
//! signed pagination cursors.

pub mod bucket;
pub mod cursor;
pub mod types;

pub use bucket::{day_bucket, enumerate_day_buckets};
pub use cursor::{
    ContinuationKey, CursorCodec, CursorError, CursorSecret, ResumeState, CURSOR_VERSION,
};
pub use types::{
    sort_page, EarthquakeEvent, EpochMillis, InvalidRequest, QueryRequest, QueryResult,
    TimeRange, DAY_MILLIS, DEFAULT_PAGE_SIZE, MAX_MAGNITUDE, MAX_PAGE_SIZE, MAX_WINDOW_MILLIS,
    MIN_MAGNITUDE, MIN_PAGE_SIZE,
};
