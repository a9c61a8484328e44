// memtalk-common - Shared types and protocol definitions for the memtalk client
//
// This crate defines the memcached text protocol codec, the error taxonomy
// and the metrics interface used by memtalk-client.

pub mod error;
pub mod metrics;
pub mod protocol;
pub mod types;

// Re-export for convenience
pub use error::*;
pub use metrics::{InMemoryCollector, MetricsCollector, Tag};
pub use types::*;
