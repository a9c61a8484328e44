//! # Connection Pool
//!
//! Purpose: Keep a fixed set of persistent transports per cluster node and
//! lend them out one caller at a time.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Every transport is created up front; the pool
//!    never opens more than `connections_per_node` per node.
//! 2. **Backpressure by Blocking**: An empty node queue makes callers wait
//!    (optionally bounded by `acquire_timeout`) instead of dialing more.
//! 3. **RAII Return**: `PooledTransport` puts its transport back on drop, so
//!    every exit path of an operation releases it.
//! 4. **Minimal Locking**: The per-node mutex is held only while moving
//!    transports in and out of the queue.
//!
//! ## Invariant
//! For every node, transports checked out plus transports queued equals
//! `connections_per_node` for the lifetime of the pool (shutdown drains the
//! queues and keeps them empty).

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use memtalk_common::{MemtalkError, MemtalkResult, Node};

use crate::config::ClientConfig;
use crate::telemetry::Telemetry;
use crate::transport::Transport;

struct NodeSlots {
    node: Node,
    idle: Mutex<VecDeque<Transport>>,
    available: Condvar,
}

/// Per-node pools of persistent transports.
pub struct ConnectionPool {
    slots: Vec<NodeSlots>,
    connections_per_node: usize,
    acquire_timeout: Option<Duration>,
    shutting_down: AtomicBool,
    telemetry: Telemetry,
}

impl ConnectionPool {
    /// Builds `connections_per_node` unconnected transports for every node.
    ///
    /// Nothing is dialed here. Any invalid node fails the whole pool.
    pub fn new(config: &ClientConfig) -> MemtalkResult<Self> {
        Self::with_telemetry(config, Telemetry::disabled())
    }

    pub(crate) fn with_telemetry(config: &ClientConfig, telemetry: Telemetry) -> MemtalkResult<Self> {
        config.validate()?;

        let transport_config = Arc::new(config.transport.clone());
        let mut slots = Vec::with_capacity(config.nodes.len());
        for node in &config.nodes {
            let mut idle = VecDeque::with_capacity(config.connections_per_node);
            for _ in 0..config.connections_per_node {
                idle.push_back(Transport::new(node.clone(), transport_config.clone())?);
            }
            slots.push(NodeSlots {
                node: node.clone(),
                idle: Mutex::new(idle),
                available: Condvar::new(),
            });
        }

        debug!(
            nodes = slots.len(),
            connections_per_node = config.connections_per_node,
            "connection pool created"
        );

        Ok(ConnectionPool {
            slots,
            connections_per_node: config.connections_per_node,
            acquire_timeout: config.acquire_timeout,
            shutting_down: AtomicBool::new(false),
            telemetry,
        })
    }

    /// Takes a transport for node `index`, waiting while none is idle.
    ///
    /// Fails with `ShuttingDown` once shutdown has started, and with
    /// `PoolTimeout` when `acquire_timeout` elapses first.
    pub fn acquire(&self, index: usize) -> MemtalkResult<PooledTransport<'_>> {
        let slots = self.slots(index)?;
        let start = self.telemetry.is_enabled().then(Instant::now);
        let deadline = self.acquire_timeout.map(|timeout| Instant::now() + timeout);

        let mut idle = slots.idle.lock();
        let transport = loop {
            // Checked under the queue lock so shutdown cannot slip in between.
            if self.shutting_down.load(Ordering::Acquire) {
                return Err(MemtalkError::ShuttingDown);
            }
            if let Some(transport) = idle.pop_front() {
                break transport;
            }
            match deadline {
                None => slots.available.wait(&mut idle),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Err(MemtalkError::PoolTimeout {
                            node: slots.node.address(),
                        });
                    }
                    slots.available.wait_until(&mut idle, deadline);
                }
            }
        };
        drop(idle);

        if let Some(start) = start {
            self.telemetry.node_acquired(&slots.node.host, start.elapsed());
        }

        Ok(PooledTransport {
            pool: self,
            index,
            transport: Some(transport),
        })
    }

    /// Returns a transport to its node queue.
    ///
    /// Dropping the guard does the same; this spells it out at call sites.
    pub fn release(&self, transport: PooledTransport<'_>) {
        drop(transport);
    }

    /// Dials every idle transport that holds no socket yet.
    ///
    /// Holds each node's queue lock while dialing, so run it before traffic.
    pub fn connect_all(&self) -> MemtalkResult<()> {
        for slots in &self.slots {
            let mut idle = slots.idle.lock();
            for transport in idle.iter_mut().filter(|t| !t.is_connected()) {
                transport.connect()?;
            }
        }
        Ok(())
    }

    /// Closes every transport exactly once and refuses further acquisitions.
    ///
    /// Waits for checked-out transports to come back. Returns the number of
    /// transports closed; a repeated call closes nothing and returns 0.
    pub fn shutdown(&self) -> usize {
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("already shutting down...");
            return 0;
        }

        info!("shutting down...");
        let mut closed = 0;
        for (index, slots) in self.slots.iter().enumerate() {
            info!(index, node = %slots.node, "closing node connections");

            let mut idle = slots.idle.lock();
            // Wake waiting acquirers so they observe the flag.
            slots.available.notify_all();

            let mut drained = 0;
            while drained < self.connections_per_node {
                match idle.pop_front() {
                    Some(mut transport) => {
                        debug!(node = %slots.node, "closing connection...");
                        transport.close();
                        drained += 1;
                    }
                    None => slots.available.wait(&mut idle),
                }
            }
            closed += drained;
        }

        info!(closed, "all connections closed");
        closed
    }

    /// Returns true once shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Idle transports currently queued for node `index`.
    pub fn available(&self, index: usize) -> usize {
        self.slots
            .get(index)
            .map_or(0, |slots| slots.idle.lock().len())
    }

    pub fn num_nodes(&self) -> usize {
        self.slots.len()
    }

    pub fn connections_per_node(&self) -> usize {
        self.connections_per_node
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.slots.get(index).map(|slots| &slots.node)
    }

    fn slots(&self, index: usize) -> MemtalkResult<&NodeSlots> {
        self.slots.get(index).ok_or(MemtalkError::UnknownNode {
            index,
            nodes: self.slots.len(),
        })
    }

    fn put_back(&self, index: usize, transport: Transport) {
        let slots = &self.slots[index];
        slots.idle.lock().push_back(transport);
        if self.shutting_down.load(Ordering::Acquire) {
            // The drain loop may be waiting behind refused acquirers.
            slots.available.notify_all();
        } else {
            slots.available.notify_one();
        }
    }
}

/// Transport checked out of the pool; returns itself on drop.
pub struct PooledTransport<'a> {
    pool: &'a ConnectionPool,
    index: usize,
    transport: Option<Transport>,
}

impl PooledTransport<'_> {
    /// Index of the node this transport talks to.
    pub fn node_index(&self) -> usize {
        self.index
    }
}

impl Deref for PooledTransport<'_> {
    type Target = Transport;

    fn deref(&self) -> &Transport {
        self.transport.as_ref().expect("transport present until drop")
    }
}

impl DerefMut for PooledTransport<'_> {
    fn deref_mut(&mut self) -> &mut Transport {
        self.transport.as_mut().expect("transport present until drop")
    }
}

impl Drop for PooledTransport<'_> {
    fn drop(&mut self) {
        if let Some(transport) = self.transport.take() {
            self.pool.put_back(self.index, transport);
        }
    }
}
