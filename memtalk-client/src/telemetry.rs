//! Metric emission for pool and operation events.
//!
//! A thin wrapper over the optional `MetricsCollector`; every call is a no-op
//! when the client was built without one.

use std::sync::Arc;
use std::time::Duration;

use memtalk_common::metrics::{
    METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_NODE_CONN_AVAILABLE_TIME,
    METRIC_NODE_DISTRIBUTION, METRIC_OPERATION_COUNT, METRIC_OPERATION_TIME, TAG_NODE,
    TAG_OPERATION,
};
use memtalk_common::protocol::Outcome;
use memtalk_common::{Command, MetricsCollector, Tag};

#[derive(Clone, Default)]
pub(crate) struct Telemetry {
    collector: Option<Arc<dyn MetricsCollector>>,
}

impl Telemetry {
    pub(crate) fn new(collector: Option<Arc<dyn MetricsCollector>>) -> Self {
        Telemetry { collector }
    }

    pub(crate) fn disabled() -> Self {
        Telemetry::default()
    }

    #[inline]
    pub(crate) fn is_enabled(&self) -> bool {
        self.collector.is_some()
    }

    /// A node was picked and a pooled transport became available after `waited`.
    pub(crate) fn node_acquired(&self, host: &str, waited: Duration) {
        if let Some(collector) = &self.collector {
            let tags = [Tag::new(TAG_NODE, host)];
            collector.count(METRIC_NODE_DISTRIBUTION, 1.0, &tags);
            collector.maximum(METRIC_NODE_CONN_AVAILABLE_TIME, millis(waited), &tags);
        }
    }

    pub(crate) fn operation(&self, host: &str, cmd: Command) {
        if let Some(collector) = &self.collector {
            collector.count(METRIC_OPERATION_COUNT, 1.0, &operation_tags(host, cmd));
        }
    }

    pub(crate) fn operation_time(&self, host: &str, cmd: Command, elapsed: Duration) {
        if let Some(collector) = &self.collector {
            collector.maximum(
                METRIC_OPERATION_TIME,
                millis(elapsed),
                &operation_tags(host, cmd),
            );
        }
    }

    pub(crate) fn cache_outcome(&self, host: &str, cmd: Command, outcome: Outcome) {
        if let Some(collector) = &self.collector {
            let metric = match outcome {
                Outcome::Success => METRIC_CACHE_HIT,
                Outcome::Miss => METRIC_CACHE_MISS,
            };
            collector.count(metric, 1.0, &operation_tags(host, cmd));
        }
    }
}

fn operation_tags(host: &str, cmd: Command) -> [Tag<'_>; 2] {
    [Tag::new(TAG_NODE, host), Tag::new(TAG_OPERATION, cmd.name())]
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
