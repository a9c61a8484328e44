//! # Cluster Fan-Out
//!
//! Operations that treat the cluster as a set of replicas: write or delete a
//! key on every node, read it back from any one of them.
//!
//! Fan-out walks nodes in index order and keeps each node's transport until
//! the whole fan-out finishes. The fixed order means two concurrent fan-outs
//! cannot each hold a node the other is waiting for.

use std::time::Duration;

use bytes::Bytes;

use memtalk_common::protocol;
use memtalk_common::{MemtalkResult, StorageCommand};

use crate::client::Client;
use crate::pool::PooledTransport;

impl Client {
    /// Stores the key on every node.
    ///
    /// Returns one result per node, in node order.
    pub fn cluster_storage(
        &self,
        cmd: StorageCommand,
        key: &[u8],
        value: &[u8],
        ttl: Duration,
    ) -> Vec<MemtalkResult<bool>> {
        self.fan_out(key, |client, transport| {
            client.base_storage(transport, cmd, key, value, ttl)
        })
    }

    /// Reads a replicated key from one randomly chosen node.
    pub fn cluster_get(&self, key: &[u8]) -> MemtalkResult<Option<Bytes>> {
        protocol::validate_key(key)?;
        let mut transport = self.acquire_node(self.router_random())?;
        self.base_get(&mut transport, key)
    }

    /// Deletes the key from every node.
    ///
    /// Returns one result per node, in node order.
    pub fn cluster_delete(&self, key: &[u8]) -> Vec<MemtalkResult<bool>> {
        self.fan_out(key, |client, transport| client.base_delete(transport, key))
    }

    fn fan_out<F>(&self, key: &[u8], mut op: F) -> Vec<MemtalkResult<bool>>
    where
        F: FnMut(&Client, &mut PooledTransport<'_>) -> MemtalkResult<bool>,
    {
        let nodes = self.num_nodes();
        let mut results = Vec::with_capacity(nodes);
        // Released together when the fan-out completes.
        let mut held: Vec<PooledTransport<'_>> = Vec::with_capacity(nodes);

        for index in 0..nodes {
            let result = protocol::validate_key(key)
                .and_then(|_| self.acquire_node(index))
                .and_then(|mut transport| {
                    let result = op(self, &mut transport);
                    held.push(transport);
                    result
                });
            results.push(result);
        }

        drop(held);
        results
    }
}
