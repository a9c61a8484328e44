//! # Key Router
//!
//! Maps a routing key to a node index: the last byte of the routing hash (or
//! of the cache key when no hash is given) modulo the node count. Empty
//! sources are spread uniformly at random.
//!
//! The scheme is deliberately coarse; callers that want real sharding supply
//! well-distributed routing hashes.

use rand::Rng;

/// Deterministic last-byte router over a fixed node count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Router {
    nodes: usize,
}

impl Router {
    /// Creates a router over `nodes` nodes (at least one).
    pub fn new(nodes: usize) -> Self {
        debug_assert!(nodes > 0, "router needs at least one node");
        Router {
            nodes: nodes.max(1),
        }
    }

    /// Picks the node for a request.
    ///
    /// An absent or empty `routing_hash` falls back to `key`.
    #[inline]
    pub fn route(&self, routing_hash: Option<&[u8]>, key: &[u8]) -> usize {
        let source = match routing_hash {
            Some(hash) if !hash.is_empty() => hash,
            _ => key,
        };
        match source.last() {
            Some(&last) => last as usize % self.nodes,
            None => self.random(),
        }
    }

    /// Uniformly random node index.
    pub fn random(&self) -> usize {
        rand::thread_rng().gen_range(0..self.nodes)
    }
}
