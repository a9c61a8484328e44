mod common;

use std::time::Duration;

use common::{config_for, dead_node, FakeMemcached};
use memtalk_client::{Client, MemtalkError, StorageCommand};

const TTL: Duration = Duration::from_secs(60);

fn cluster(size: usize) -> (Vec<FakeMemcached>, Client) {
    let servers: Vec<FakeMemcached> = (0..size).map(|_| FakeMemcached::start()).collect();
    let nodes = servers.iter().map(|s| s.node.clone()).collect();
    let client = Client::new(config_for(nodes, 3)).expect("client");
    (servers, client)
}

#[test]
fn cluster_storage_writes_every_node() {
    let (servers, client) = cluster(3);

    let results = client.cluster_storage(StorageCommand::Set, b"replicated", b"payload", TTL);
    assert_eq!(results.len(), 3);
    for result in results {
        assert!(result.expect("stored"));
    }
    for server in &servers {
        assert_eq!(server.value(b"replicated"), Some(b"payload".to_vec()));
    }

    let results = client.cluster_storage(StorageCommand::Add, b"replicated", b"again", TTL);
    assert!(results.into_iter().all(|r| matches!(r, Ok(false))));

    client.shutdown();
}

#[test]
fn cluster_get_reads_from_any_replica() {
    let (servers, client) = cluster(3);

    for result in client.cluster_storage(StorageCommand::Set, b"shared", b"same", TTL) {
        assert!(result.expect("stored"));
    }

    for _ in 0..60 {
        let value = client.cluster_get(b"shared").expect("get");
        assert_eq!(value.as_deref(), Some(&b"same"[..]));
    }
    assert_eq!(client.cluster_get(b"nobody").expect("get"), None);

    // Reads spread across nodes, so a key held by one node hits only sometimes.
    servers[0].insert(b"lonely", b"only-here");
    let mut hits = 0;
    for _ in 0..60 {
        if client.cluster_get(b"lonely").expect("get").is_some() {
            hits += 1;
        }
    }
    assert!(hits > 0 && hits < 60);

    client.shutdown();
}

#[test]
fn cluster_delete_removes_every_copy() {
    let (servers, client) = cluster(3);

    for result in client.cluster_storage(StorageCommand::Set, b"gone", b"soon", TTL) {
        assert!(result.expect("stored"));
    }

    let results = client.cluster_delete(b"gone");
    assert!(results.into_iter().all(|r| matches!(r, Ok(true))));
    for server in &servers {
        assert_eq!(server.value(b"gone"), None);
    }

    let results = client.cluster_delete(b"gone");
    assert!(results.into_iter().all(|r| matches!(r, Ok(false))));

    client.shutdown();
}

#[test]
fn fan_out_reports_per_node_failures() {
    let healthy = FakeMemcached::start();
    let mut config = config_for(vec![healthy.node.clone(), dead_node()], 1);
    config.transport.max_write_retries = 2;
    config.transport.reconnection_timeout = Duration::from_millis(5);
    let client = Client::new(config).expect("client");

    let results = client.cluster_storage(StorageCommand::Set, b"partial", b"v", TTL);
    assert_eq!(results.len(), 2);
    assert!(matches!(results[0], Ok(true)));
    match &results[1] {
        Err(err) => assert!(err.is_retryable(), "unexpected error: {err:?}"),
        Ok(stored) => panic!("dead node stored: {stored}"),
    }
    assert_eq!(healthy.value(b"partial"), Some(b"v".to_vec()));

    // Every transport is back in its queue once the fan-out returns.
    assert_eq!(client.pool().available(0), 1);
    assert_eq!(client.pool().available(1), 1);

    client.shutdown();
}

#[test]
fn fan_out_rejects_invalid_keys_per_node() {
    let (servers, client) = cluster(2);

    let results = client.cluster_delete(b"bad key");
    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|r| matches!(r, Err(MemtalkError::InvalidKey(_)))));
    assert!(matches!(
        client.cluster_get(b""),
        Err(MemtalkError::InvalidKey(_))
    ));
    assert!(servers.iter().all(|s| s.accepted() == 0));

    client.shutdown();
}

#[test]
fn fan_out_after_shutdown_fails_everywhere() {
    let (_servers, client) = cluster(2);
    client.shutdown();

    let results = client.cluster_storage(StorageCommand::Set, b"late", b"v", TTL);
    assert!(results
        .iter()
        .all(|r| matches!(r, Err(MemtalkError::ShuttingDown))));
}
