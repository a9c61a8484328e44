//! # Metrics Collaborator
//!
//! The client reports node distribution, pool wait time, operation counts,
//! operation latency and cache hit/miss outcomes through the narrow
//! [`MetricsCollector`] interface. The backend behind it is up to the
//! embedder; [`InMemoryCollector`] is a small reference backend.
//!
//! ## Design Principles
//! 1. **Narrow Interface**: Two calls, `count` and `maximum`, cover every
//!    metric the client emits.
//! 2. **Paired Tags**: Tags are explicit key/value pairs, never a flat list
//!    whose pairing could drift.
//! 3. **Accumulator Pattern**: The reference collector aggregates into maps
//!    keyed by metric + tags and exposes plain snapshots.

use std::fmt;

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::Mutex;

/// Times a node was picked to serve an operation.
pub const METRIC_NODE_DISTRIBUTION: &str = "memtalk.node.distribution.count";
/// Milliseconds spent waiting for a pooled connection.
pub const METRIC_NODE_CONN_AVAILABLE_TIME: &str = "memtalk.node.conn.available.time";
/// Operations issued, per node and command.
pub const METRIC_OPERATION_COUNT: &str = "memtalk.operation.count";
/// Milliseconds from send to classified reply.
pub const METRIC_OPERATION_TIME: &str = "memtalk.operation.time";
/// Successful store/fetch/delete replies.
pub const METRIC_CACHE_HIT: &str = "memtalk.cache.hit";
/// Not stored / not found replies.
pub const METRIC_CACHE_MISS: &str = "memtalk.cache.miss";

/// Tag key carrying the node host.
pub const TAG_NODE: &str = "node";
/// Tag key carrying the command name.
pub const TAG_OPERATION: &str = "operation";

/// One metric tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag<'a> {
    pub key: &'static str,
    pub value: &'a str,
}

impl<'a> Tag<'a> {
    pub const fn new(key: &'static str, value: &'a str) -> Self {
        Tag { key, value }
    }
}

impl fmt::Display for Tag<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Sink for client metrics.
///
/// Implementations must be cheap and must not block for long: calls happen
/// on the request path, some of them while a pooled connection is held.
pub trait MetricsCollector: Send + Sync {
    /// Adds `value` to a counter.
    fn count(&self, metric: &str, value: f64, tags: &[Tag<'_>]);

    /// Reports a gauge sample where the maximum over a window is of interest.
    fn maximum(&self, metric: &str, value: f64, tags: &[Tag<'_>]);
}

/// Kind of aggregation a sample went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    Count,
    Maximum,
}

/// Aggregated value for one metric + tag set.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub kind: SampleKind,
    pub metric: String,
    pub tags: Vec<(String, String)>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
    kind: SampleKind,
    metric: String,
    tags: Vec<(String, String)>,
}

impl SeriesKey {
    fn new(kind: SampleKind, metric: &str, tags: &[Tag<'_>]) -> Self {
        SeriesKey {
            kind,
            metric: metric.to_string(),
            tags: tags
                .iter()
                .map(|tag| (tag.key.to_string(), tag.value.to_string()))
                .collect(),
        }
    }
}

/// Thread-safe collector that keeps every series in memory.
///
/// `count` accumulates, `maximum` keeps the largest sample seen. Tag order is
/// significant, matching how the client emits tags.
#[derive(Default)]
pub struct InMemoryCollector {
    series: Mutex<HashMap<SeriesKey, f64, RandomState>>,
}

impl InMemoryCollector {
    pub fn new() -> Self {
        InMemoryCollector::default()
    }

    /// Accumulated counter value for an exact metric + tags pair.
    pub fn counter(&self, metric: &str, tags: &[Tag<'_>]) -> f64 {
        let key = SeriesKey::new(SampleKind::Count, metric, tags);
        self.series.lock().get(&key).copied().unwrap_or(0.0)
    }

    /// Maximum gauge sample for an exact metric + tags pair.
    pub fn max_gauge(&self, metric: &str, tags: &[Tag<'_>]) -> Option<f64> {
        let key = SeriesKey::new(SampleKind::Maximum, metric, tags);
        self.series.lock().get(&key).copied()
    }

    /// Sum of a counter across all tag sets.
    pub fn counter_total(&self, metric: &str) -> f64 {
        self.series
            .lock()
            .iter()
            .filter(|(key, _)| key.kind == SampleKind::Count && key.metric == metric)
            .map(|(_, value)| *value)
            .sum()
    }

    /// Point-in-time copy of every series, sorted by metric name.
    pub fn snapshot(&self) -> Vec<Sample> {
        let mut samples: Vec<Sample> = self
            .series
            .lock()
            .iter()
            .map(|(key, value)| Sample {
                kind: key.kind,
                metric: key.metric.clone(),
                tags: key.tags.clone(),
                value: *value,
            })
            .collect();
        samples.sort_by(|a, b| a.metric.cmp(&b.metric).then_with(|| a.tags.cmp(&b.tags)));
        samples
    }

    /// Drops every series.
    pub fn reset(&self) {
        self.series.lock().clear();
    }
}

impl MetricsCollector for InMemoryCollector {
    fn count(&self, metric: &str, value: f64, tags: &[Tag<'_>]) {
        let key = SeriesKey::new(SampleKind::Count, metric, tags);
        *self.series.lock().entry(key).or_insert(0.0) += value;
    }

    fn maximum(&self, metric: &str, value: f64, tags: &[Tag<'_>]) {
        let key = SeriesKey::new(SampleKind::Maximum, metric, tags);
        let mut series = self.series.lock();
        let slot = series.entry(key).or_insert(value);
        if value > *slot {
            *slot = value;
        }
    }
}
