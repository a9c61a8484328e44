//! # Error Taxonomy
//!
//! Every fallible client call returns [`MemtalkResult`]. The variants keep
//! transient connection conditions (timeouts, EOF, dial failures) apart from
//! faults that retrying cannot fix (bad configuration, protocol mismatches),
//! so callers can decide whether to retry a whole operation.

use std::io;

use thiserror::Error;

use crate::types::{Command, IoOp};

/// Result type used across the workspace.
pub type MemtalkResult<T> = Result<T, MemtalkError>;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum MemtalkError {
    /// Invalid node list or transport settings; fatal at construction.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// `host:port` did not resolve to any socket address.
    #[error("failed to resolve address {address}: {source}")]
    AddressResolution {
        address: String,
        #[source]
        source: io::Error,
    },

    /// TCP connect to a resolved address failed.
    #[error("failed to connect to {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The transport holds no live socket.
    #[error("not connected to {address}")]
    NotConnected { address: String },

    /// A read or write hit its deadline.
    #[error("{op} timed out on {address}")]
    Timeout { op: IoOp, address: String },

    /// The peer closed the stream (EOF or broken pipe).
    #[error("connection to {address} closed by peer during {op}")]
    ConnectionClosed { op: IoOp, address: String },

    /// Any other socket error.
    #[error("{op} failed on {address}: {source}")]
    Io {
        op: IoOp,
        address: String,
        #[source]
        source: io::Error,
    },

    /// The reply did not match any token expected for the command.
    #[error(
        "protocol error on command {command}: {reason} (response: {:?})",
        String::from_utf8_lossy(.response)
    )]
    Protocol {
        command: Command,
        reason: &'static str,
        response: Vec<u8>,
    },

    /// Key cannot be sent over the text protocol.
    #[error("invalid key: {0}")]
    InvalidKey(&'static str),

    /// The client started shutting down; no more connections are lent.
    #[error("client is shutting down")]
    ShuttingDown,

    /// No pooled connection became available within the acquire timeout.
    #[error("timed out waiting for a pooled connection to {node}")]
    PoolTimeout { node: String },

    /// Node index outside the configured node list.
    #[error("node index {index} out of range ({nodes} nodes)")]
    UnknownNode { index: usize, nodes: usize },
}

impl MemtalkError {
    /// Returns true for transient connection conditions.
    ///
    /// Protocol, configuration and usage errors are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MemtalkError::AddressResolution { .. }
                | MemtalkError::Dial { .. }
                | MemtalkError::NotConnected { .. }
                | MemtalkError::Timeout { .. }
                | MemtalkError::ConnectionClosed { .. }
                | MemtalkError::Io { .. }
                | MemtalkError::PoolTimeout { .. }
        )
    }

    /// Classifies a socket error observed during `op` on `address`.
    ///
    /// Deadline and EOF-like kinds get their own variants so they can be
    /// logged apart from generic failures.
    pub fn from_io(err: io::Error, op: IoOp, address: &str) -> Self {
        let address = address.to_string();
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                MemtalkError::Timeout { op, address }
            }
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => MemtalkError::ConnectionClosed { op, address },
            _ => MemtalkError::Io {
                op,
                address,
                source: err,
            },
        }
    }
}
