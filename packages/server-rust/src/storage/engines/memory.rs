//! In-memory [`PartitionStore`] implementation backed by [`DashMap`].
//!
//! Each day bucket holds a `BTreeMap` ordered by `(event_time, event_id)`,
//! the same sort key a partitioned key-value store would use, so scans and
//! continuation keys behave like range queries against a real table.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

use anyhow::{anyhow, bail, Context as _};
use async_trait::async_trait;
use dashmap::DashMap;
use quakefeed_core::{day_bucket, ContinuationKey, EarthquakeEvent, EpochMillis};
use serde_json::Value as JsonValue;

use crate::storage::config::StoreConfig;
use crate::storage::partition_store::{PartitionPage, PartitionQuery, PartitionStore};

/// Position of an event inside its partition.
type SortKey = (EpochMillis, String);

/// In-memory event store sharded by UTC day.
///
/// Readers and writers on different buckets never contend; `DashMap`
/// shards the bucket map internally.
pub struct MemoryEventStore {
    partitions: DashMap<String, BTreeMap<SortKey, EarthquakeEvent>>,
    config: StoreConfig,
}

impl MemoryEventStore {
    /// Creates an empty store with default tuning.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates an empty store with the given tuning.
    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            partitions: DashMap::new(),
            config,
        }
    }

    /// Inserts or replaces an event in the bucket of its UTC day.
    ///
    /// # Errors
    ///
    /// Returns an error if the event time has no calendar representation.
    pub fn insert(&self, event: EarthquakeEvent) -> anyhow::Result<()> {
        let bucket = day_bucket(event.event_time)
            .ok_or_else(|| anyhow!("event {} has an unrepresentable time", event.event_id))?;
        let key = (event.event_time, event.event_id.clone());
        self.partitions.entry(bucket).or_default().insert(key, event);
        Ok(())
    }

    /// Inserts every event, returning how many were stored.
    ///
    /// # Errors
    ///
    /// Stops at the first event that cannot be bucketed.
    pub fn insert_all(
        &self,
        events: impl IntoIterator<Item = EarthquakeEvent>,
    ) -> anyhow::Result<usize> {
        let mut count = 0;
        for event in events {
            self.insert(event)?;
            count += 1;
        }
        Ok(count)
    }

    /// Loads a JSON array of events from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an event
    /// cannot be bucketed.
    pub fn load_seed_file(&self, path: &Path) -> anyhow::Result<usize> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        let events: Vec<EarthquakeEvent> = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing seed file {}", path.display()))?;
        self.insert_all(events)
    }

    /// Total number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.value().len()).sum()
    }

    /// Whether the store holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(|p| p.value().is_empty())
    }

    /// Number of non-empty day buckets.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes a sort key as an opaque continuation marker.
fn encode_continuation(bucket: &str, key: &SortKey) -> ContinuationKey {
    let mut map = serde_json::Map::new();
    map.insert("bucket".to_string(), JsonValue::from(bucket));
    map.insert("eventTime".to_string(), JsonValue::from(key.0));
    map.insert("eventId".to_string(), JsonValue::from(key.1.as_str()));
    ContinuationKey(map)
}

/// Decodes a continuation marker produced by [`encode_continuation`].
fn decode_continuation(bucket: &str, key: &ContinuationKey) -> anyhow::Result<SortKey> {
    let key_bucket = key.get("bucket").and_then(JsonValue::as_str);
    if key_bucket != Some(bucket) {
        bail!("continuation key does not belong to bucket {bucket}");
    }
    let time = key
        .get("eventTime")
        .and_then(JsonValue::as_i64)
        .ok_or_else(|| anyhow!("continuation key is missing eventTime"))?;
    let id = key
        .get("eventId")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| anyhow!("continuation key is missing eventId"))?;
    Ok((time, id.to_string()))
}

#[async_trait]
impl PartitionStore for MemoryEventStore {
    async fn query_partition(&self, query: &PartitionQuery) -> anyhow::Result<PartitionPage> {
        if query.limit == 0 {
            bail!("partition query limit must be positive");
        }

        let lower = match &query.continuation {
            Some(key) => Bound::Excluded(decode_continuation(&query.bucket, key)?),
            None => Bound::Included((query.time_range.start, String::new())),
        };

        let Some(partition) = self.partitions.get(&query.bucket) else {
            return Ok(PartitionPage::exhausted());
        };

        let end = query.time_range.end;
        let cap = self.config.fetch_cap(query.limit);
        let mut records = partition
            .range((lower, Bound::Unbounded))
            .filter(|((time, _), _)| *time >= query.time_range.start)
            .take_while(|((time, _), _)| *time <= end)
            .peekable();

        let mut items = Vec::new();
        let mut scanned = 0;
        let mut last_key: Option<&SortKey> = None;
        while scanned < cap && items.len() < query.limit {
            let Some((key, event)) = records.next() else {
                break;
            };
            scanned += 1;
            last_key = Some(key);
            if event.magnitude >= query.min_magnitude {
                items.push(event.clone());
            }
        }

        let continuation = match (records.peek(), last_key) {
            (Some(_), Some(key)) => Some(encode_continuation(&query.bucket, key)),
            _ => None,
        };

        tracing::trace!(
            bucket = %query.bucket,
            scanned,
            matched = items.len(),
            more = continuation.is_some(),
            "partition scan"
        );

        Ok(PartitionPage {
            items,
            continuation,
        })
    }
}
