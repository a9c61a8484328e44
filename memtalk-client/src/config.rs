//! # Client Configuration
//!
//! Purpose: Describe the cluster and the per-connection behaviour of the
//! client, and reject unusable settings before any pool is built.
//!
//! Durations travel as milliseconds when (de)serialized, so a JSON document
//! such as the one below configures a two-node client:
//!
//! ```text
//! {
//!   "nodes": [{"host": "10.0.0.1", "port": 11211}, {"host": "10.0.0.2", "port": 11211}],
//!   "connections_per_node": 3,
//!   "transport": {
//!     "reconnection_timeout_ms": 1000,
//!     "read_timeout_ms": 5000,
//!     "write_timeout_ms": 5000,
//!     "max_write_retries": 3,
//!     "read_buffer_size": 2048
//!   }
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use memtalk_common::{MemtalkError, MemtalkResult, Node};

/// Per-connection settings shared by every pooled transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Pause after a failed reconnect before the next write attempt.
    #[serde(rename = "reconnection_timeout_ms", with = "millis")]
    pub reconnection_timeout: Duration,
    /// Deadline applied to every response read.
    #[serde(rename = "read_timeout_ms", with = "millis")]
    pub read_timeout: Duration,
    /// Deadline applied to every payload write.
    #[serde(rename = "write_timeout_ms", with = "millis")]
    pub write_timeout: Duration,
    /// Optional TCP connect timeout; `None` uses the OS default.
    #[serde(
        rename = "connect_timeout_ms",
        with = "millis_opt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub connect_timeout: Option<Duration>,
    /// Write attempts per payload, reconnects included.
    pub max_write_retries: usize,
    /// Initial read buffer size in bytes; the buffer grows past it.
    pub read_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            reconnection_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            connect_timeout: None,
            max_write_retries: 3,
            read_buffer_size: 2048,
        }
    }
}

impl TransportConfig {
    /// Checks retry and buffer settings.
    pub fn validate(&self) -> MemtalkResult<()> {
        if self.max_write_retries == 0 {
            return Err(MemtalkError::Config(
                "max_write_retries must be at least 1".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(MemtalkError::Config(
                "read_buffer_size must be positive".to_string(),
            ));
        }
        // Zero socket timeouts are rejected by std::net.
        if self.read_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err(MemtalkError::Config(
                "read and write timeouts must be positive".to_string(),
            ));
        }
        if self.connect_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(MemtalkError::Config(
                "connect timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the client and its per-node pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Cluster members; routing indexes into this list.
    pub nodes: Vec<Node>,
    /// Pooled connections kept for each node.
    pub connections_per_node: usize,
    /// Settings for every connection.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Longest wait for a pooled connection; `None` waits forever.
    #[serde(
        rename = "acquire_timeout_ms",
        with = "millis_opt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub acquire_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Creates a configuration with default transport settings.
    pub fn new(nodes: Vec<Node>, connections_per_node: usize) -> Self {
        ClientConfig {
            nodes,
            connections_per_node,
            transport: TransportConfig::default(),
            acquire_timeout: None,
        }
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json(json: &str) -> MemtalkResult<Self> {
        let config: ClientConfig = serde_json::from_str(json)
            .map_err(|err| MemtalkError::Config(format!("malformed configuration: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the client cannot run with.
    pub fn validate(&self) -> MemtalkResult<()> {
        if self.nodes.is_empty() {
            return Err(MemtalkError::Config("no nodes configured".to_string()));
        }
        for node in &self.nodes {
            if node.host.trim().is_empty() {
                return Err(MemtalkError::Config(
                    "empty server host configured".to_string(),
                ));
            }
            if node.port == 0 {
                return Err(MemtalkError::Config(format!(
                    "invalid server port configured for host {}",
                    node.host
                )));
            }
        }
        if self.connections_per_node == 0 {
            return Err(MemtalkError::Config(
                "connections_per_node must be at least 1".to_string(),
            ));
        }
        self.transport.validate()
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod millis_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
