//! # Persistent Transport
//!
//! Purpose: Own one long-lived TCP connection to a cluster node, write
//! request payloads with bounded reconnect-and-retry, and read replies until
//! a protocol terminator closes them.
//!
//! ## Design Principles
//! 1. **Lazy Dial**: A transport starts without a socket; the first failed
//!    write attempt (or an explicit `connect`) opens it.
//! 2. **Bounded Retry**: Each payload gets `max_write_retries` attempts; a
//!    failed attempt closes the socket and reconnects, sleeping
//!    `reconnection_timeout` when the reconnect itself fails.
//! 3. **Terminator Framing**: Replies have no length prefix, so reads append
//!    into a growable buffer until the codec reports the reply complete.
//! 4. **Buffer Reuse**: The read chunk lives on the transport and is reused
//!    across calls.
//!
//! ## Failure Policy
//! - A failed read (timeout, EOF, socket error) closes the transport so the
//!   next write reconnects instead of reusing a half-read stream.
//! - EOF is reported as `ConnectionClosed`, timeouts as `Timeout`; both are
//!   logged apart from generic socket errors.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;

use bytes::BytesMut;
use tracing::{debug, error, info, warn};

use memtalk_common::protocol;
use memtalk_common::{IoOp, MemtalkError, MemtalkResult, Node};

use crate::config::TransportConfig;

/// Persistent connection to one node.
///
/// A transport is never shared: the pool lends it to one caller at a time.
pub struct Transport {
    node: Node,
    // Cached "host:port" for logs and errors.
    address: String,
    resolved: Option<SocketAddr>,
    stream: Option<TcpStream>,
    config: Arc<TransportConfig>,
    read_chunk: Vec<u8>,
}

impl Transport {
    /// Creates an unconnected transport for `node`.
    ///
    /// Fails with `Config` on a blank host or a zero port.
    pub fn new(node: Node, config: Arc<TransportConfig>) -> MemtalkResult<Self> {
        if node.host.trim().is_empty() {
            return Err(MemtalkError::Config(
                "empty server host configured".to_string(),
            ));
        }
        if node.port == 0 {
            return Err(MemtalkError::Config(
                "invalid server port configured".to_string(),
            ));
        }

        Ok(Transport {
            address: node.address(),
            node,
            resolved: None,
            stream: None,
            read_chunk: Vec::with_capacity(config.read_buffer_size),
            config,
        })
    }

    /// Resolves the node address and opens a TCP connection.
    ///
    /// Re-resolves and re-dials every time; callers close first.
    pub fn connect(&mut self) -> MemtalkResult<()> {
        let addr = self.resolve()?;

        let stream = match self.config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        }
        .map_err(|source| {
            error!(node = %self.address, %addr, error = %source, "error connecting to address");
            MemtalkError::Dial {
                address: self.address.clone(),
                source,
            }
        })?;

        // Start without stale deadlines; reads and writes set their own.
        let prepared = stream
            .set_read_timeout(None)
            .and_then(|_| stream.set_write_timeout(None))
            // Disable Nagle to keep request latency low for small payloads.
            .and_then(|_| stream.set_nodelay(true));
        if let Err(source) = prepared {
            error!(node = %self.address, error = %source, "error preparing connection");
            return Err(MemtalkError::Dial {
                address: self.address.clone(),
                source,
            });
        }

        self.stream = Some(stream);
        info!(node = %self.address, "connected");
        Ok(())
    }

    /// Closes the socket if there is one. Safe to call repeatedly.
    pub fn close(&mut self) {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => return,
        };

        if let Err(err) = stream.shutdown(Shutdown::Both) {
            // The peer may already be gone; that is not worth an error.
            if err.kind() != io::ErrorKind::NotConnected {
                error!(node = %self.address, error = %err, "error closing connection");
            }
        }
        drop(stream);
        info!(node = %self.address, "connection closed");
    }

    /// Returns true while a socket is held.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Writes each payload in order, retrying with reconnects.
    ///
    /// Stops at the first payload whose attempts are exhausted and returns
    /// the last error seen for it; later payloads are not sent.
    pub fn send(&mut self, payloads: &[&[u8]]) -> MemtalkResult<()> {
        for payload in payloads {
            self.send_payload(payload)?;
        }
        Ok(())
    }

    /// Reads one reply, stopping once its last line is one of `terminators`.
    ///
    /// The buffer starts at the configured `read_buffer_size` and grows as
    /// needed.
    pub fn receive(&mut self, terminators: &[&[u8]]) -> MemtalkResult<BytesMut> {
        self.receive_with_hint(terminators, self.config.read_buffer_size)
    }

    /// Same as [`Transport::receive`] with an explicit buffer size hint.
    pub fn receive_with_hint(
        &mut self,
        terminators: &[&[u8]],
        size_hint: usize,
    ) -> MemtalkResult<BytesMut> {
        let result = self.read_reply(terminators, size_hint.max(1));
        if let Err(err) = &result {
            log_connection_error(err);
            self.close();
        }
        result
    }

    /// Returns `host:port`.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn host(&self) -> &str {
        &self.node.host
    }

    pub fn port(&self) -> u16 {
        self.node.port
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Socket address from the most recent resolution, if any.
    pub fn resolved_address(&self) -> Option<SocketAddr> {
        self.resolved
    }

    fn resolve(&mut self) -> MemtalkResult<SocketAddr> {
        debug!(node = %self.address, "resolving address");

        let resolved = (self.node.host.as_str(), self.node.port)
            .to_socket_addrs()
            .and_then(|mut addrs| {
                addrs.next().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "no addresses returned")
                })
            });

        match resolved {
            Ok(addr) => {
                self.resolved = Some(addr);
                Ok(addr)
            }
            Err(source) => {
                error!(node = %self.address, error = %source, "error resolving address");
                Err(MemtalkError::AddressResolution {
                    address: self.address.clone(),
                    source,
                })
            }
        }
    }

    fn send_payload(&mut self, payload: &[u8]) -> MemtalkResult<()> {
        let max_attempts = self.config.max_write_retries.max(1);
        let mut last_err = None;

        for attempt in 1..=max_attempts {
            let err = match self.write_payload(payload) {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            debug!(node = %self.address, attempt, max_attempts, error = %err, "write attempt failed");
            last_err = Some(err);

            self.close();
            if let Err(err) = self.connect() {
                last_err = Some(err);
                if attempt < max_attempts {
                    thread::sleep(self.config.reconnection_timeout);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| MemtalkError::NotConnected {
            address: self.address.clone(),
        }))
    }

    fn write_payload(&mut self, payload: &[u8]) -> MemtalkResult<()> {
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => {
                return Err(MemtalkError::NotConnected {
                    address: self.address.clone(),
                })
            }
        };

        if let Err(err) = stream.set_write_timeout(Some(self.config.write_timeout)) {
            error!(node = %self.address, error = %err, "error setting write deadline");
            return Err(MemtalkError::from_io(err, IoOp::Write, &self.address));
        }

        let written = stream.write_all(payload).and_then(|_| stream.flush());
        if let Err(err) = written {
            let err = MemtalkError::from_io(err, IoOp::Write, &self.address);
            log_connection_error(&err);
            return Err(err);
        }
        Ok(())
    }

    fn read_reply(&mut self, terminators: &[&[u8]], size_hint: usize) -> MemtalkResult<BytesMut> {
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => {
                return Err(MemtalkError::NotConnected {
                    address: self.address.clone(),
                })
            }
        };

        if let Err(err) = stream.set_read_timeout(Some(self.config.read_timeout)) {
            error!(node = %self.address, error = %err, "error setting read deadline");
            return Err(MemtalkError::from_io(err, IoOp::Read, &self.address));
        }

        self.read_chunk.resize(size_hint, 0);
        let mut reply = BytesMut::with_capacity(size_hint);

        loop {
            match stream.read(&mut self.read_chunk) {
                Ok(0) => {
                    return Err(MemtalkError::ConnectionClosed {
                        op: IoOp::Read,
                        address: self.address.clone(),
                    })
                }
                Ok(n) => {
                    reply.extend_from_slice(&self.read_chunk[..n]);
                    if protocol::is_complete(&reply, terminators) {
                        return Ok(reply);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(MemtalkError::from_io(err, IoOp::Read, &self.address)),
            }
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("node", &self.address)
            .field("resolved", &self.resolved)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

fn log_connection_error(err: &MemtalkError) {
    match err {
        MemtalkError::ConnectionClosed { op, address } => {
            warn!(node = %address, %op, "connection EOF received, retrying connection...");
        }
        MemtalkError::Timeout { op, address } => {
            warn!(node = %address, %op, "connection timeout received, retrying connection...");
        }
        MemtalkError::NotConnected { address } => {
            debug!(node = %address, "no live connection");
        }
        other => {
            error!(error = %other, "error executing operation on connection");
        }
    }
}
