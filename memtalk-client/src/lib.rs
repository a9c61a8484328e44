//! # memtalk Sync Client
//!
//! Purpose: Provide a blocking memcached cluster client speaking the text
//! protocol over pooled, persistent TCP connections.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: A fixed set of persistent connections per node
//!    avoids repeated handshakes and bounds server-side connection counts.
//! 2. **Deterministic Routing**: The last byte of a routing hash (or key)
//!    picks the node, so callers control placement.
//! 3. **Transparent Reconnects**: Writes retry with reconnects up to a bound;
//!    everything past that bound is an explicit error.
//! 4. **Protocol Clarity**: Commands are rendered and replies classified
//!    explicitly by `memtalk_common::protocol`.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use memtalk_client::{Client, ClientConfig, Node, StorageCommand};
//!
//! let config = ClientConfig::new(vec![Node::new("127.0.0.1", 11211)], 3);
//! let client = Client::new(config)?;
//!
//! let stored = client.storage(StorageCommand::Add, None, b"test1", b"test1", Duration::from_secs(60))?;
//! assert!(stored);
//! let value = client.get(None, b"test1")?;
//! assert_eq!(value.as_deref(), Some(&b"test1"[..]));
//!
//! client.shutdown();
//! # Ok::<(), memtalk_client::MemtalkError>(())
//! ```

mod client;
mod cluster;
mod config;
mod pool;
mod router;
mod telemetry;
mod transport;

pub use client::Client;
pub use config::{ClientConfig, TransportConfig};
pub use pool::{ConnectionPool, PooledTransport};
pub use router::Router;
pub use transport::Transport;

pub use memtalk_common::metrics;
pub use memtalk_common::protocol;
pub use memtalk_common::{
    Command, InMemoryCollector, IoOp, MemtalkError, MemtalkResult, MetricsCollector, Node,
    StorageCommand, Tag,
};
