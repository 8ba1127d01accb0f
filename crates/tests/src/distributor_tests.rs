//! End-to-end tests of the public routes: epoch maintenance fills the pools,
//! the distributor selects and fans out, and the enforcer scores the
//! responses once every node answered.

use crate::mock_infrastructure::{
    activities_body, activity_body, address, eventually, hub, node, tampered_activity,
    workers_status_body, NodeMockBuilder, TestHub,
};
use hub_core::distributor::{AccountQuery, ActivityQuery, DistributorError};
use serde_json::json;
use std::time::Duration;

const WORKERS: &[(&str, &str)] = &[("ethereum", "core"), ("polygon", "core")];

/// Starts `count` nodes that all report the same ready workers; the first
/// node carries the most stake.
async fn online_hub(count: u8) -> (TestHub, Vec<NodeMockBuilder>) {
    let mut mocks = Vec::new();
    let mut nodes = Vec::new();
    for byte in 1..=count {
        let mut mock = NodeMockBuilder::new().await;
        mock.mock_workers_status(&workers_status_body(WORKERS, false)).await;
        let mut registered = node(byte, &mock.url());
        registered.staking = f64::from(count - byte) * 2_000.0;
        nodes.push(registered);
        mocks.push(mock);
    }

    let h = hub(nodes).await;
    let report = h.runtime.enforcer().maintain_epoch(1).await.unwrap();
    assert_eq!(report.full_nodes, usize::from(count));
    (h, mocks)
}

fn epoch_invalid(h: &TestHub, byte: u8) -> u64 {
    h.repository.stat(&address(byte)).map_or(0, |stat| stat.epoch_invalid_request)
}

fn epoch_requests(h: &TestHub, byte: u8) -> u64 {
    h.repository.stat(&address(byte)).map_or(0, |stat| stat.epoch_request)
}

#[tokio::test]
async fn test_failing_node_is_penalized_after_the_winner_returns() {
    let (h, mut mocks) = online_hub(3).await;
    mocks[0].mock_activity("0xabc", &activity_body("0xabc", "ethereum")).await;
    mocks[1].mock_activity("0xabc", &activity_body("0xabc", "ethereum")).await;
    mocks[2].mock_status("/decentralized/tx/0xabc", 500).await;

    let query = ActivityQuery::from_pairs("0xabc", &[]).unwrap();
    let body = h.runtime.distributor().route_by_id(&query).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["data"]["id"], "0xabc");

    assert!(eventually(Duration::from_secs(3), || epoch_invalid(&h, 3) == 1).await);
    assert_eq!(epoch_invalid(&h, 1), 0);
    assert_eq!(epoch_invalid(&h, 2), 0);
    assert!(epoch_requests(&h, 1) >= 1);

    let invalid = h.repository.invalid_responses();
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].address, address(3));
    h.runtime.shutdown().await;
}

#[tokio::test]
async fn test_every_node_without_result_is_not_found() {
    let (h, mut mocks) = online_hub(3).await;
    for mock in &mut mocks {
        mock.mock_status("/decentralized/tx/0xmissing", 404).await;
    }

    let query = ActivityQuery::from_pairs("0xmissing", &[]).unwrap();
    let result = h.runtime.distributor().route_by_id(&query).await;

    assert!(matches!(result, Err(DistributorError::NoResults)));
    h.runtime.shutdown().await;
}

#[tokio::test]
async fn test_partial_check_catches_a_forged_activity() {
    let (h, mut mocks) = online_hub(4).await;
    let list = activities_body(&["0xa1"], "ethereum");
    for mock in mocks.iter_mut().take(3) {
        mock.mock_account("0xowner", &list).await;
    }
    mocks[3].mock_activity("0xa1", &json!({"data": tampered_activity("0xa1", "ethereum")})).await;

    let query = AccountQuery::from_pairs("0xowner", &[]).unwrap();
    let body = h.runtime.distributor().route_by_account(&query).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["data"][0]["id"], "0xa1");

    let penalized = || (1..=3).map(|byte| epoch_invalid(&h, byte)).sum::<u64>() == 1;
    assert!(eventually(Duration::from_secs(3), penalized).await);
    assert_eq!(epoch_invalid(&h, 4), 0);
    h.runtime.shutdown().await;
}

#[tokio::test]
async fn test_matching_secondary_leaves_responders_clean() {
    let (h, mut mocks) = online_hub(4).await;
    let list = activities_body(&["0xa1"], "ethereum");
    for mock in mocks.iter_mut().take(3) {
        mock.mock_account("0xowner", &list).await;
    }
    mocks[3].mock_activity("0xa1", &activity_body("0xa1", "ethereum")).await;

    let query = AccountQuery::from_pairs("0xowner", &[]).unwrap();
    h.runtime.distributor().route_by_account(&query).await.unwrap();

    assert!(eventually(Duration::from_secs(3), || epoch_requests(&h, 1) >= 1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!((1..=4).all(|byte| epoch_invalid(&h, byte) == 0));
    h.runtime.shutdown().await;
}

#[tokio::test]
async fn test_rss_without_rss_nodes_is_unavailable() {
    let (h, _mocks) = online_hub(2).await;

    let result = h.runtime.distributor().route_rss("/abc/feed", &[]).await;

    assert!(matches!(result, Err(DistributorError::NoQualifiedNodes)));
    h.runtime.shutdown().await;
}

#[tokio::test]
async fn test_rss_passes_feed_through() {
    let mut rss_node = NodeMockBuilder::new().await;
    rss_node.mock_workers_status(&workers_status_body(&[], true)).await;
    rss_node.mock_rss("abc/feed", "<rss><channel/></rss>").await;

    let h = hub(vec![node(1, &rss_node.url())]).await;
    let report = h.runtime.enforcer().maintain_epoch(1).await.unwrap();
    assert_eq!(report.rss_nodes, 1);

    let body = h.runtime.distributor().route_rss("/abc/feed", &[]).await.unwrap();
    assert_eq!(&body[..], b"<rss><channel/></rss>");
    h.runtime.shutdown().await;
}
