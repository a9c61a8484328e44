//! # Synchronous Client API
//!
//! Purpose: Expose a compact, blocking API for `add`/`set`/`get`/`delete`
//! against a memcached cluster over the text protocol.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Client` hides routing, pooling and protocol details.
//! 2. **Borrow-Friendly API**: Accept `&[u8]` to avoid unnecessary copies.
//! 3. **Zero-Copy Values**: Fetched values are `Bytes` slices of the reply.
//! 4. **Fail Fast**: Protocol violations surface immediately and are never
//!    retried; the offending connection is closed so the next caller starts
//!    on a fresh stream.
//!
//! ## Request Flow
//!
//! ```text
//! Client::get(hash, key)
//!   └── Router::route          -> node index
//!         └── ConnectionPool::acquire  -> PooledTransport
//!               ├── protocol::encode_key_only
//!               ├── Transport::send / Transport::receive
//!               ├── protocol::classify (+ extract_value on a hit)
//!               └── drop(PooledTransport) -> back to the node queue
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tracing::debug;

use memtalk_common::protocol::{self, Outcome, ResponseSet};
use memtalk_common::{Command, MemtalkResult, MetricsCollector, Node, StorageCommand};

use crate::config::ClientConfig;
use crate::pool::{ConnectionPool, PooledTransport};
use crate::router::Router;
use crate::telemetry::Telemetry;
use crate::transport::Transport;

/// Blocking cluster client with per-node connection pools.
///
/// Cheap to share behind an `Arc`; every call borrows one pooled transport
/// for its duration.
pub struct Client {
    pool: ConnectionPool,
    router: Router,
    nodes: Vec<Node>,
    telemetry: Telemetry,
}

impl Client {
    /// Creates a client without metrics.
    pub fn new(config: ClientConfig) -> MemtalkResult<Self> {
        Self::build(config, None)
    }

    /// Creates a client reporting to `collector`.
    pub fn with_metrics(
        config: ClientConfig,
        collector: Arc<dyn MetricsCollector>,
    ) -> MemtalkResult<Self> {
        Self::build(config, Some(collector))
    }

    fn build(
        config: ClientConfig,
        collector: Option<Arc<dyn MetricsCollector>>,
    ) -> MemtalkResult<Self> {
        let telemetry = Telemetry::new(collector);
        let pool = ConnectionPool::with_telemetry(&config, telemetry.clone())?;
        Ok(Client {
            router: Router::new(config.nodes.len()),
            nodes: config.nodes,
            pool,
            telemetry,
        })
    }

    /// Stores `value` under `key` with `add` or `set` semantics.
    ///
    /// Returns `Ok(false)` when the server answered `NOT_STORED` (for `add`,
    /// the key already exists). `ttl` is truncated to whole seconds.
    pub fn storage(
        &self,
        cmd: StorageCommand,
        routing_hash: Option<&[u8]>,
        key: &[u8],
        value: &[u8],
        ttl: Duration,
    ) -> MemtalkResult<bool> {
        protocol::validate_key(key)?;
        let mut transport = self.acquire_routed(routing_hash, key)?;
        self.base_storage(&mut transport, cmd, key, value, ttl)
    }

    /// Fetches a value. Returns `Ok(None)` when the key is missing.
    pub fn get(&self, routing_hash: Option<&[u8]>, key: &[u8]) -> MemtalkResult<Option<Bytes>> {
        protocol::validate_key(key)?;
        let mut transport = self.acquire_routed(routing_hash, key)?;
        self.base_get(&mut transport, key)
    }

    /// Deletes a key. Returns `Ok(false)` when the key did not exist.
    pub fn delete(&self, routing_hash: Option<&[u8]>, key: &[u8]) -> MemtalkResult<bool> {
        protocol::validate_key(key)?;
        let mut transport = self.acquire_routed(routing_hash, key)?;
        self.base_delete(&mut transport, key)
    }

    /// Borrows the pooled transport `route(routing_hash, key)` would use.
    ///
    /// Useful for raw `send`/`receive` traffic; the transport returns to the
    /// pool when the guard drops.
    pub fn acquire_routed(
        &self,
        routing_hash: Option<&[u8]>,
        key: &[u8],
    ) -> MemtalkResult<PooledTransport<'_>> {
        self.pool.acquire(self.router.route(routing_hash, key))
    }

    /// Borrows a pooled transport for node `index`.
    pub fn acquire_node(&self, index: usize) -> MemtalkResult<PooledTransport<'_>> {
        self.pool.acquire(index)
    }

    /// Dials every pooled transport now instead of on first use.
    pub fn connect_all(&self) -> MemtalkResult<()> {
        self.pool.connect_all()
    }

    /// Closes every connection; blocks until checked-out ones come back.
    ///
    /// Idempotent. Returns the number of connections closed by this call.
    pub fn shutdown(&self) -> usize {
        self.pool.shutdown()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.pool.is_shutting_down()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub(crate) fn base_storage(
        &self,
        transport: &mut Transport,
        cmd: StorageCommand,
        key: &[u8],
        value: &[u8],
        ttl: Duration,
    ) -> MemtalkResult<bool> {
        let mut request = Vec::new();
        protocol::encode_storage(cmd, key, value, ttl.as_secs(), &mut request);
        let (outcome, _) = self.execute(transport, cmd.into(), &request)?;
        Ok(outcome.is_success())
    }

    pub(crate) fn base_get(
        &self,
        transport: &mut Transport,
        key: &[u8],
    ) -> MemtalkResult<Option<Bytes>> {
        let mut request = Vec::new();
        protocol::encode_key_only(Command::Get, key, &mut request);
        let (outcome, reply) = self.execute(transport, Command::Get, &request)?;
        if !outcome.is_success() {
            return Ok(None);
        }

        let range = match protocol::extract_value(&reply) {
            Ok(range) => range,
            Err(err) => {
                transport.close();
                return Err(err);
            }
        };
        Ok(Some(reply.freeze().slice(range)))
    }

    pub(crate) fn base_delete(&self, transport: &mut Transport, key: &[u8]) -> MemtalkResult<bool> {
        let mut request = Vec::new();
        protocol::encode_key_only(Command::Delete, key, &mut request);
        let (outcome, _) = self.execute(transport, Command::Delete, &request)?;
        Ok(outcome.is_success())
    }

    pub(crate) fn router_random(&self) -> usize {
        self.router.random()
    }

    /// Sends one rendered command and classifies the reply.
    fn execute(
        &self,
        transport: &mut Transport,
        cmd: Command,
        request: &[u8],
    ) -> MemtalkResult<(Outcome, BytesMut)> {
        self.telemetry.operation(transport.host(), cmd);

        let start = Instant::now();
        transport.send(&[request])?;
        let reply = transport.receive(ResponseSet::for_command(cmd).terminators)?;

        let outcome = match protocol::classify(cmd, &reply) {
            Ok(outcome) => outcome,
            Err(err) => {
                debug!(node = %transport.address(), command = %cmd, "closing connection after protocol error");
                transport.close();
                return Err(err);
            }
        };

        self.telemetry
            .operation_time(transport.host(), cmd, start.elapsed());
        self.telemetry.cache_outcome(transport.host(), cmd, outcome);
        Ok((outcome, reply))
    }
}
