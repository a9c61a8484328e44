#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use memtalk_client::{ClientConfig, Node, TransportConfig};

type Store = Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>;

/// In-process memcached speaking the add/set/get/delete subset.
pub struct FakeMemcached {
    pub node: Node,
    store: Store,
    accepted: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl FakeMemcached {
    pub fn start() -> Self {
        Self::spawn(None)
    }

    /// Server that hangs up after answering `requests` requests per connection.
    pub fn start_closing_after(requests: usize) -> Self {
        Self::spawn(Some(requests))
    }

    fn spawn(close_after: Option<usize>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let store: Store = Arc::new(Mutex::new(HashMap::new()));
        let accepted = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let server_store = store.clone();
        let server_accepted = accepted.clone();
        let server_closed = closed.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(_) => break,
                };
                server_accepted.fetch_add(1, Ordering::SeqCst);
                let store = server_store.clone();
                let closed = server_closed.clone();
                thread::spawn(move || {
                    serve_connection(stream, &store, close_after);
                    closed.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        FakeMemcached {
            node: Node::new("127.0.0.1", port),
            store,
            accepted,
            closed,
        }
    }

    pub fn value(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.store.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &[u8], value: &[u8]) {
        self.store
            .lock()
            .unwrap()
            .insert(key.to_vec(), value.to_vec());
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Polls until `count` connections have been accepted or `timeout` passes.
    pub fn wait_for_accepted(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.accepted() >= count)
    }

    /// Polls until `count` connections have ended or `timeout` passes.
    pub fn wait_for_closed(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.closed() >= count)
    }
}

fn wait_until(timeout: Duration, done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

fn serve_connection(stream: TcpStream, store: &Store, close_after: Option<usize>) {
    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(_) => return,
    };
    let mut reader = BufReader::new(stream);
    let mut served = 0;

    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        let reply = match handle_command(&line, &mut reader, store) {
            Some(reply) => reply,
            None => return,
        };
        if writer.write_all(&reply).is_err() {
            return;
        }

        served += 1;
        if close_after.is_some_and(|limit| served >= limit) {
            let _ = writer.shutdown(Shutdown::Both);
            return;
        }
    }
}

fn handle_command(
    line: &[u8],
    reader: &mut BufReader<TcpStream>,
    store: &Store,
) -> Option<Vec<u8>> {
    let line = line.strip_suffix(b"\r\n").unwrap_or(line);
    let parts: Vec<&[u8]> = line.split(|&b| b == b' ').collect();

    match parts.first().copied() {
        Some(b"set") | Some(b"add") if parts.len() == 5 => {
            let len: usize = std::str::from_utf8(parts[4]).ok()?.parse().ok()?;
            let mut data = vec![0u8; len + 2];
            reader.read_exact(&mut data).ok()?;
            data.truncate(len);

            let mut store = store.lock().unwrap();
            if parts[0] == b"add" && store.contains_key(parts[1]) {
                return Some(b"NOT_STORED\r\n".to_vec());
            }
            store.insert(parts[1].to_vec(), data);
            Some(b"STORED\r\n".to_vec())
        }
        Some(b"get") if parts.len() == 2 => {
            let store = store.lock().unwrap();
            let mut reply = Vec::new();
            if let Some(value) = store.get(parts[1]) {
                reply.extend_from_slice(b"VALUE ");
                reply.extend_from_slice(parts[1]);
                reply.extend_from_slice(format!(" 0 {}\r\n", value.len()).as_bytes());
                reply.extend_from_slice(value);
                reply.extend_from_slice(b"\r\n");
            }
            reply.extend_from_slice(b"END\r\n");
            Some(reply)
        }
        Some(b"delete") if parts.len() == 2 => {
            if store.lock().unwrap().remove(parts[1]).is_some() {
                Some(b"DELETED\r\n".to_vec())
            } else {
                Some(b"NOT_FOUND\r\n".to_vec())
            }
        }
        _ => Some(b"ERROR\r\n".to_vec()),
    }
}

/// Accepts one connection and answers each request read with the next
/// canned reply. Closes the connection once the replies run out when
/// `close_when_done` is set, otherwise drains until the client leaves.
pub fn spawn_scripted(replies: Vec<Vec<u8>>, close_when_done: bool) -> Node {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let node = Node::new("127.0.0.1", listener.local_addr().expect("addr").port());

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut buf = [0u8; 4096];
        for reply in replies {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            let _ = stream.write_all(&reply);
            let _ = stream.flush();
        }
        if close_when_done {
            return;
        }
        while let Ok(n) = stream.read(&mut buf) {
            if n == 0 {
                break;
            }
        }
    });

    node
}

/// Fast-failing transport settings for tests.
pub fn test_transport() -> TransportConfig {
    TransportConfig {
        reconnection_timeout: Duration::from_millis(20),
        read_timeout: Duration::from_secs(1),
        write_timeout: Duration::from_secs(1),
        connect_timeout: Some(Duration::from_secs(1)),
        max_write_retries: 3,
        read_buffer_size: 2048,
    }
}

pub fn config_for(nodes: Vec<Node>, connections_per_node: usize) -> ClientConfig {
    ClientConfig {
        nodes,
        connections_per_node,
        transport: test_transport(),
        acquire_timeout: None,
    }
}

/// A node address with nothing listening behind it.
pub fn dead_node() -> Node {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    Node::new("127.0.0.1", port)
}

/// Opt-in log output: `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
