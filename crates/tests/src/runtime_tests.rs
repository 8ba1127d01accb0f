//! Integration tests for the hub runtime builder and lifecycle.
//!
//! These tests verify the runtime's behavioral contracts:
//! - Builder configuration validation and error handling
//! - Seeded in-memory registry and component wiring
//! - Shutdown signal distribution to every receiver
//! - Epoch listener start and stop
//!
//! Tests use `tokio::time::timeout` to prevent hanging on failures.

use crate::mock_infrastructure::{address, node, workers_status_body, NodeMockBuilder};
use hub_core::{
    config::AppConfig,
    enforcer::announce_epoch,
    runtime::{HubRuntimeBuilder, RuntimeError},
    store::MemoryStore,
    types::{Address, NodeClass},
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::time::{timeout, Duration};

fn seeded_config(endpoint: &str) -> AppConfig {
    AppConfig { seed_nodes: vec![node(1, endpoint)], ..AppConfig::default() }
}

#[tokio::test]
async fn test_builder_rejects_duplicate_seed_nodes() {
    let mut config = seeded_config("http://node-1.test");
    config.seed_nodes.push(node(1, "http://node-1b.test"));

    let result = HubRuntimeBuilder::new().with_config(config).build().await;

    assert!(matches!(result, Err(RuntimeError::ConfigValidation(_))));
}

#[tokio::test]
async fn test_builder_rejects_seed_without_http_endpoint() {
    let result =
        HubRuntimeBuilder::new().with_config(seeded_config("node-1.test")).build().await;

    assert!(matches!(result, Err(RuntimeError::ConfigValidation(_))));
}

#[tokio::test]
async fn test_shutdown_signal_broadcast_to_all_receivers() {
    let runtime = HubRuntimeBuilder::new()
        .with_config(AppConfig::default())
        .build()
        .await
        .expect("Failed to build runtime");

    let received_count = Arc::new(AtomicUsize::new(0));
    let mut tasks = Vec::new();
    for _ in 0..3 {
        let mut rx = runtime.shutdown_receiver();
        let count = received_count.clone();
        tasks.push(tokio::spawn(async move {
            if rx.recv().await.is_ok() {
                count.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }

    runtime.shutdown().await;

    for task in tasks {
        timeout(Duration::from_secs(2), task)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }
    assert_eq!(received_count.load(Ordering::SeqCst), 3, "All 3 receivers should be notified");
}

#[tokio::test]
async fn test_seeded_node_goes_online_on_announced_epoch() {
    let mut node_mock = NodeMockBuilder::new().await;
    node_mock.mock_workers_status(&workers_status_body(&[("ethereum", "core")], true)).await;

    let store = Arc::new(MemoryStore::new());
    let runtime = HubRuntimeBuilder::new()
        .with_config(seeded_config(&node_mock.url()))
        .with_store(store.clone())
        .enable_epoch_listener()
        .build()
        .await
        .expect("Failed to build runtime");

    announce_epoch(store.as_ref(), "epoch", 1).await.unwrap();

    let index = Arc::clone(runtime.components().index());
    let indexed: Vec<Address> = timeout(Duration::from_secs(3), async {
        loop {
            let top = index.retrieve_qualified_nodes(NodeClass::Full, 5).await.unwrap();
            if !top.is_empty() {
                break top.into_iter().map(|n| n.address).collect();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("seeded node should be indexed");
    assert_eq!(indexed, vec![address(1)]);

    timeout(Duration::from_secs(2), runtime.shutdown()).await.expect("shutdown should complete");
}

#[tokio::test]
async fn test_index_survives_restart_on_shared_store() {
    let mut node_mock = NodeMockBuilder::new().await;
    node_mock.mock_workers_status(&workers_status_body(&[("ethereum", "core")], false)).await;
    let store = Arc::new(MemoryStore::new());

    let first = HubRuntimeBuilder::new()
        .with_config(seeded_config(&node_mock.url()))
        .with_store(store.clone())
        .build()
        .await
        .unwrap();
    first.enforcer().maintain_epoch(1).await.unwrap();
    first.shutdown().await;

    let second = HubRuntimeBuilder::new()
        .with_config(seeded_config(&node_mock.url()))
        .with_store(store)
        .build()
        .await
        .unwrap();
    let index = second.components().index();
    let top = index.retrieve_qualified_nodes(NodeClass::Full, 5).await.unwrap();
    assert_eq!(top.len(), 1);
    second.shutdown().await;
}
