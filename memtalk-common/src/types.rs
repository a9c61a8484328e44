//! # Cluster and Command Types
//!
//! Core data types shared by the client and the protocol codec: cluster
//! nodes, the closed set of memcached commands, and I/O direction tags used
//! in diagnostics.
//!
//! ## Design Principles
//!
//! 1. **Closed Command Set**: `Command` is an enum, so an unknown command can
//!    never be rendered onto the wire.
//! 2. **Typed Storage Subset**: `StorageCommand` narrows `Command` to the two
//!    storage verbs, letting the compiler reject `Get`/`Delete` where a
//!    storage verb is required.
//! 3. **Immutable Nodes**: `Node` is a plain value; it is validated once when
//!    the client is built and never mutated afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One member of the cache cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Hostname or IP literal of the server.
    pub host: String,
    /// TCP port of the server (must be non-zero).
    pub port: u16,
}

impl Node {
    /// Creates a node description.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Node {
            host: host.into(),
            port,
        }
    }

    /// Returns `host:port`, the string handed to address resolution.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns true when the host is non-blank and the port is non-zero.
    pub fn is_valid(&self) -> bool {
        !self.host.trim().is_empty() && self.port > 0
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Commands modeled by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Stores a key only if it does not exist yet.
    Add,
    /// Stores a key whether it exists or not.
    Set,
    /// Fetches a key.
    Get,
    /// Removes a key.
    Delete,
}

impl Command {
    /// Wire verb for the command.
    #[inline]
    pub const fn as_bytes(&self) -> &'static [u8] {
        match self {
            Command::Add => b"add",
            Command::Set => b"set",
            Command::Get => b"get",
            Command::Delete => b"delete",
        }
    }

    /// Verb as text, used for metric tags and error messages.
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Command::Add => "add",
            Command::Set => "set",
            Command::Get => "get",
            Command::Delete => "delete",
        }
    }

    /// Returns true for `Add` and `Set`.
    #[inline]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Command::Add | Command::Set)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Storage subset of [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageCommand {
    /// See [`Command::Add`].
    Add,
    /// See [`Command::Set`].
    Set,
}

impl From<StorageCommand> for Command {
    fn from(cmd: StorageCommand) -> Self {
        match cmd {
            StorageCommand::Add => Command::Add,
            StorageCommand::Set => Command::Set,
        }
    }
}

impl fmt::Display for StorageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Command::from(*self).fmt(f)
    }
}

/// Direction of a socket operation, carried by I/O errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Read,
    Write,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoOp::Read => f.write_str("read"),
            IoOp::Write => f.write_str("write"),
        }
    }
}
