//! Paginated query execution across day partitions.
//!
//! Every call is self-contained: the engine decodes the caller's cursor (if
//! any), scans buckets in order from the resume position, and either
//! finishes the window or hands back a fresh cursor. Nothing is kept
//! between calls.
//!
//! A page stops early in two cases:
//!
//! - the page is full; the cursor points at the partition where the page
//!   filled, or at the next partition when that one was read to the end
//! - the store reports more records in the current partition without
//!   filling the page (its internal read cap was hit); the cursor pins the
//!   current partition and its continuation key

use std::sync::Arc;

use quakefeed_core::{
    enumerate_day_buckets, sort_page, ContinuationKey, CursorCodec, EarthquakeEvent,
    QueryRequest, QueryResult, ResumeState,
};
use tracing::{field, info_span, Instrument};

use super::error::QueryError;
use crate::storage::{PartitionQuery, PartitionStore};

/// Where a query scan begins.
#[derive(Debug)]
struct ScanPlan {
    buckets: Vec<String>,
    start_index: usize,
    continuation: Option<ContinuationKey>,
}

/// Where the next page resumes: bucket index plus optional continuation key.
type ResumePoint = (usize, Option<ContinuationKey>);

/// Executes paginated earthquake queries against an injected store.
///
/// Shared across requests behind an `Arc`; holds no per-request state.
pub struct QueryEngine {
    store: Arc<dyn PartitionStore>,
    codec: Arc<CursorCodec>,
}

impl QueryEngine {
    /// Creates an engine over `store` that signs cursors with `codec`.
    #[must_use]
    pub fn new(store: Arc<dyn PartitionStore>, codec: Arc<CursorCodec>) -> Self {
        Self { store, codec }
    }

    /// The codec used to sign and verify cursors.
    #[must_use]
    pub fn codec(&self) -> Arc<CursorCodec> {
        Arc::clone(&self.codec)
    }

    /// Runs one page of `request`.
    ///
    /// Cursor problems are detected before any store call is issued. A
    /// store failure aborts the page; nothing accumulated so far is returned.
    ///
    /// # Errors
    ///
    /// - [`QueryError::InvalidRequest`] if the window or magnitude is out of bounds
    /// - [`QueryError::Cursor`] if the cursor is malformed, forged, from an
    ///   unsupported version, or bound to different parameters
    /// - [`QueryError::StoreUnavailable`] if a partition query fails
    pub async fn execute(&self, request: QueryRequest) -> Result<QueryResult, QueryError> {
        let request = request.validate()?;

        let span = info_span!(
            "query",
            resumed = request.cursor.is_some(),
            page_size = request.page_size,
            buckets = field::Empty,
            start_index = field::Empty,
            buckets_scanned = field::Empty,
            items = field::Empty,
            has_more = field::Empty,
            outcome = field::Empty,
        );

        async move {
            let result = match self.plan(&request) {
                Ok(plan) => {
                    let span = tracing::Span::current();
                    span.record("buckets", plan.buckets.len());
                    span.record("start_index", plan.start_index);
                    self.scan(&request, plan).await
                }
                Err(e) => Err(e),
            };

            let span = tracing::Span::current();
            match &result {
                Ok(page) => {
                    span.record("buckets_scanned", page.buckets_scanned);
                    span.record("items", page.items.len());
                    span.record("has_more", page.next_cursor.is_some());
                    span.record("outcome", "ok");
                    tracing::debug!("query page complete");
                }
                Err(e) => {
                    span.record("outcome", e.code());
                    if e.is_client_error() {
                        tracing::debug!(error = %e, "query rejected");
                    } else {
                        tracing::warn!(error = %e, "query failed");
                    }
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Resolves the bucket list and resume position, verifying the cursor.
    fn plan(&self, request: &QueryRequest) -> Result<ScanPlan, QueryError> {
        let Some(token) = &request.cursor else {
            return Ok(ScanPlan {
                buckets: enumerate_day_buckets(request.start_time, request.end_time),
                start_index: 0,
                continuation: None,
            });
        };

        let state = self.codec.decode(token)?;
        state.verify_binding(
            request.start_time,
            request.end_time,
            request.min_magnitude,
            request.page_size,
        )?;
        Ok(ScanPlan {
            buckets: state.buckets,
            start_index: state.bucket_index,
            continuation: state.continuation,
        })
    }

    async fn scan(
        &self,
        request: &QueryRequest,
        plan: ScanPlan,
    ) -> Result<QueryResult, QueryError> {
        let page_size = request.page_size as usize;
        let mut items: Vec<EarthquakeEvent> = Vec::with_capacity(page_size);
        let mut buckets_scanned: u32 = 0;
        let mut continuation = plan.continuation;

        for index in plan.start_index..plan.buckets.len() {
            let query = PartitionQuery {
                bucket: plan.buckets[index].clone(),
                time_range: request.time_range(),
                min_magnitude: request.min_magnitude,
                limit: page_size - items.len(),
                // Only the first resumed partition continues mid-scan.
                continuation: continuation.take(),
            };

            let page = self
                .store
                .query_partition(&query)
                .await
                .map_err(QueryError::StoreUnavailable)?;
            buckets_scanned += 1;

            if page.items.len() > query.limit {
                tracing::warn!(
                    bucket = %query.bucket,
                    limit = query.limit,
                    returned = page.items.len(),
                    "store returned more items than requested"
                );
            }
            items.extend(page.items);

            if items.len() >= page_size {
                let resume = match page.continuation {
                    Some(key) => Some((index, Some(key))),
                    None if index + 1 < plan.buckets.len() => Some((index + 1, None)),
                    None => None,
                };
                return self.finish(request, plan.buckets, items, resume, buckets_scanned);
            }

            if let Some(key) = page.continuation {
                return self.finish(
                    request,
                    plan.buckets,
                    items,
                    Some((index, Some(key))),
                    buckets_scanned,
                );
            }
        }

        self.finish(request, plan.buckets, items, None, buckets_scanned)
    }

    /// Orders and truncates the page, signing a cursor when more may follow.
    fn finish(
        &self,
        request: &QueryRequest,
        buckets: Vec<String>,
        mut items: Vec<EarthquakeEvent>,
        resume: Option<ResumePoint>,
        buckets_scanned: u32,
    ) -> Result<QueryResult, QueryError> {
        sort_page(&mut items);
        items.truncate(request.page_size as usize);

        let next_cursor = match resume {
            Some((bucket_index, continuation)) => {
                let state =
                    ResumeState::for_request(request, buckets, bucket_index, continuation);
                let token = self
                    .codec
                    .encode(&state)
                    .map_err(|e| QueryError::Internal(e.to_string()))?;
                Some(token)
            }
            None => None,
        };

        Ok(QueryResult {
            items,
            next_cursor,
            buckets_scanned,
        })
    }
}
