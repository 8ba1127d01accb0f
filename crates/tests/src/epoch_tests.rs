//! Integration tests for epoch maintenance over live mock nodes.
//!
//! Each node serves `/workers_status`; the pass probes it through the HTTP
//! fetcher, derives the node's status, refreshes stats and rebuilds the
//! qualified pools.

use crate::mock_infrastructure::{address, hub, node, workers_status_body, NodeMockBuilder};
use hub_core::{
    enforcer::announce_epoch,
    repository::{all_nodes, NodeRepository},
    types::{NodeClass, NodeStatus},
};
use std::time::Duration;

#[tokio::test]
async fn test_probed_nodes_are_classified_and_indexed() {
    let mut full = NodeMockBuilder::new().await;
    let body = workers_status_body(&[("ethereum", "core"), ("polygon", "core")], true);
    full.mock_workers_status(&body).await;
    let mut partial = NodeMockBuilder::new().await;
    partial.mock_workers_status(&workers_status_body(&[("ethereum", "core")], false)).await;
    let mut down = NodeMockBuilder::new().await;
    down.mock_status("/workers_status", 503).await;

    let h = hub(vec![node(1, &full.url()), node(2, &partial.url()), node(3, &down.url())]).await;
    let report = h.runtime.enforcer().maintain_epoch(5).await.unwrap();

    assert_eq!(report.probed, 3);
    assert_eq!(report.probe_failures, 1);
    assert_eq!(report.full_nodes, 1);
    assert_eq!(report.rss_nodes, 1);

    assert_eq!(h.repository.node(&address(1)).unwrap().status, NodeStatus::Online);
    assert_eq!(h.repository.node(&address(2)).unwrap().status, NodeStatus::Online);
    assert_eq!(h.repository.node(&address(3)).unwrap().status, NodeStatus::Initializing);

    let index = h.runtime.components().index();
    let top = index.retrieve_qualified_nodes(NodeClass::Full, 10).await.unwrap();
    assert_eq!(top.iter().map(|n| n.address).collect::<Vec<_>>(), vec![address(1)]);
    let rss = index.retrieve_qualified_nodes(NodeClass::Rss, 10).await.unwrap();
    assert_eq!(rss.len(), 1);

    let batches = h.settlement.status_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].0, 5);
    assert_eq!(batches[0].1.len(), 3);

    h.runtime.shutdown().await;
}

#[tokio::test]
async fn test_indexing_worker_keeps_node_initializing() {
    let mut node_mock = NodeMockBuilder::new().await;
    let mut body = workers_status_body(&[("ethereum", "core")], false);
    body["data"]["decentralized"][0]["status"] = serde_json::json!("Indexing");
    node_mock.mock_workers_status(&body).await;

    let h = hub(vec![node(1, &node_mock.url())]).await;
    h.runtime.enforcer().maintain_epoch(1).await.unwrap();

    assert_eq!(h.repository.node(&address(1)).unwrap().status, NodeStatus::Initializing);
    assert!(h
        .runtime
        .components()
        .index()
        .retrieve_qualified_nodes(NodeClass::Full, 10)
        .await
        .unwrap()
        .is_empty());
    h.runtime.shutdown().await;
}

#[tokio::test]
async fn test_outdated_node_is_not_probed() {
    let mut node_mock = NodeMockBuilder::new().await;
    node_mock.mock_status_times("/workers_status", 200, 0).await;

    let mut old = node(1, &node_mock.url());
    old.version = "0.9.0".to_string();
    let h = hub(vec![old]).await;
    h.runtime.enforcer().maintain_epoch(1).await.unwrap();

    assert_eq!(h.repository.node(&address(1)).unwrap().status, NodeStatus::Outdated);
    node_mock.assert_all().await;
    h.runtime.shutdown().await;
}

#[tokio::test]
async fn test_failed_settlement_leaves_epoch_open_for_retry() {
    let mut node_mock = NodeMockBuilder::new().await;
    node_mock.mock_workers_status(&workers_status_body(&[("ethereum", "core")], false)).await;

    let h = hub(vec![node(1, &node_mock.url())]).await;
    h.settlement.set_failing(true);
    assert!(h.runtime.enforcer().maintain_epoch(2).await.is_err());

    h.settlement.set_failing(false);
    let report = h.runtime.enforcer().maintain_epoch(2).await.unwrap();
    assert!(!report.skipped);

    let skipped = h.runtime.enforcer().maintain_epoch(2).await.unwrap();
    assert!(skipped.skipped);
    h.runtime.shutdown().await;
}

#[tokio::test]
async fn test_epoch_announcement_drives_maintenance() {
    let mut node_mock = NodeMockBuilder::new().await;
    node_mock.mock_workers_status(&workers_status_body(&[("ethereum", "core")], false)).await;

    let h = hub(vec![node(1, &node_mock.url())]).await;
    let listener = hub_core::enforcer::EpochListener::new(
        std::sync::Arc::clone(h.runtime.enforcer()),
        h.store.clone(),
    );
    let handle = listener.start_with_shutdown(h.runtime.shutdown_receiver());

    announce_epoch(h.store.as_ref(), "epoch", 9).await.unwrap();

    let repository = h.repository.clone();
    let reached = tokio::time::timeout(Duration::from_secs(3), async move {
        loop {
            let online = all_nodes(
                repository.as_ref() as &dyn NodeRepository,
                None,
                Some(vec![NodeStatus::Online]),
            )
            .await
            .unwrap();
            if !online.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "epoch 9 was never maintained");
    assert_eq!(h.runtime.enforcer().current_epoch(), 9);

    h.runtime.shutdown().await;
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}
