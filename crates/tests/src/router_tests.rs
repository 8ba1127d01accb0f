//! Integration tests for the fan-out router over live mock nodes.

use crate::mock_infrastructure::{activity_body, address, fast_fetcher_config, NodeMockBuilder};
use futures::FutureExt;
use hub_core::{
    fetch::{FetchRequest, HttpFetcher},
    metrics::MetricsCollector,
    router::{CollectedHandler, NodeRequest, Router, RouterConfig, RouterError},
    types::DataResponse,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::oneshot;

fn router(fanout_timeout_ms: u64) -> Router {
    Router::new(
        Arc::new(HttpFetcher::new(fast_fetcher_config()).unwrap()),
        RouterConfig { fanout_timeout_ms },
        Arc::new(MetricsCollector::new()),
    )
}

fn requests(nodes: &[&NodeMockBuilder], path: &str) -> Vec<NodeRequest> {
    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| NodeRequest {
            address: address(u8::try_from(i + 1).unwrap()),
            request: FetchRequest::get(format!("{}{path}", node.url())),
        })
        .collect()
}

fn capture() -> (CollectedHandler, oneshot::Receiver<Vec<DataResponse>>) {
    let (tx, rx) = oneshot::channel();
    let handler: CollectedHandler = Box::new(move |responses| {
        async move {
            let _ = tx.send(responses);
        }
        .boxed()
    });
    (handler, rx)
}

#[tokio::test]
async fn test_valid_response_wins_over_empty_ones() {
    let empty = serde_json::json!({"data": null});
    let mut a = NodeMockBuilder::new().await;
    a.mock_activity("0xabc", &empty).await;
    let mut b = NodeMockBuilder::new().await;
    b.mock_activity("0xabc", &empty).await;
    let mut c = NodeMockBuilder::new().await;
    c.mock_activity("0xabc", &activity_body("0xabc", "ethereum")).await;

    let (handler, collected) = capture();
    let winner = router(2_000)
        .distribute(requests(&[&a, &b, &c], "/decentralized/tx/0xabc"), handler)
        .await
        .unwrap();

    assert!(winner.valid);
    assert_eq!(winner.address, address(3));

    let collected = tokio::time::timeout(Duration::from_secs(2), collected).await.unwrap().unwrap();
    assert_eq!(collected.len(), 3);
}

#[tokio::test]
async fn test_all_empty_returns_empty_response_without_error() {
    let empty = serde_json::json!({"data": null});
    let mut a = NodeMockBuilder::new().await;
    a.mock_activity("0xabc", &empty).await;
    let mut b = NodeMockBuilder::new().await;
    b.mock_activity("0xabc", &empty).await;

    let (handler, _collected) = capture();
    let response = router(2_000)
        .distribute(requests(&[&a, &b], "/decentralized/tx/0xabc"), handler)
        .await
        .unwrap();

    assert!(!response.valid);
    assert!(response.err.is_none());
}

#[tokio::test]
async fn test_all_failing_nodes_surface_an_error() {
    let mut a = NodeMockBuilder::new().await;
    a.mock_status("/decentralized/tx/0xabc", 500).await;
    let mut b = NodeMockBuilder::new().await;
    b.mock_status("/decentralized/tx/0xabc", 404).await;

    let (handler, collected) = capture();
    let result =
        router(2_000).distribute(requests(&[&a, &b], "/decentralized/tx/0xabc"), handler).await;

    assert!(matches!(result, Err(RouterError::Node { .. })));
    let collected = tokio::time::timeout(Duration::from_secs(2), collected).await.unwrap().unwrap();
    assert!(collected.iter().all(DataResponse::is_err));
}

#[tokio::test]
async fn test_unparsable_payload_is_not_a_winner() {
    let mut a = NodeMockBuilder::new().await;
    a.mock_activity("0xabc", &serde_json::json!({"unexpected": true})).await;
    let mut b = NodeMockBuilder::new().await;
    b.mock_activity("0xabc", &activity_body("0xabc", "ethereum")).await;

    let (handler, _collected) = capture();
    let winner = router(2_000)
        .distribute(requests(&[&a, &b], "/decentralized/tx/0xabc"), handler)
        .await
        .unwrap();

    assert_eq!(winner.address, address(2));
}
