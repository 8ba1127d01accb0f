//! Integration tests for `HttpFetcher` against mock nodes.

use crate::mock_infrastructure::{
    activity_body, fast_fetcher_config, workers_status_body, NodeMockBuilder,
};
use hub_core::fetch::{FetchError, FetchRequest, Fetcher, HttpFetcher};

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(fast_fetcher_config()).unwrap()
}

#[tokio::test]
async fn test_fetch_returns_body() {
    let mut node = NodeMockBuilder::new().await;
    node.mock_activity("0xabc", &activity_body("0xabc", "ethereum")).await;

    let body = fetcher()
        .fetch(&FetchRequest::get(format!("{}/decentralized/tx/0xabc", node.url())))
        .await
        .unwrap();

    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["data"]["id"], "0xabc");
}

#[tokio::test]
async fn test_not_found_is_no_result_without_retry() {
    let mut node = NodeMockBuilder::new().await;
    node.mock_status_times("/decentralized/tx/missing", 404, 1).await;

    let result = fetcher()
        .fetch(&FetchRequest::get(format!("{}/decentralized/tx/missing", node.url())))
        .await;

    assert_eq!(result, Err(FetchError::NoResult));
    node.assert_all().await;
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let mut node = NodeMockBuilder::new().await;
    node.mock_status_times("/decentralized/tx/0xabc", 503, 1).await;
    node.mock_activity("0xabc", &activity_body("0xabc", "ethereum")).await;

    let result = fetcher()
        .fetch(&FetchRequest::get(format!("{}/decentralized/tx/0xabc", node.url())))
        .await;

    assert!(result.is_ok(), "second attempt should succeed: {result:?}");
    node.assert_all().await;
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let mut node = NodeMockBuilder::new().await;
    node.mock_status_times("/decentralized/tx/0xabc", 500, 2).await;

    let result = fetcher()
        .fetch(&FetchRequest::get(format!("{}/decentralized/tx/0xabc", node.url())))
        .await;

    assert!(matches!(result, Err(FetchError::Status(500, _))));
    node.assert_all().await;
}

#[tokio::test]
async fn test_bearer_token_is_presented() {
    let mut node = NodeMockBuilder::new().await;
    let body = workers_status_body(&[("ethereum", "core")], false);
    node.mock_workers_status_with_auth("node-secret", &body).await;

    let request =
        FetchRequest::get(format!("{}/workers_status", node.url())).with_auth("node-secret");
    let result = fetcher().fetch(&request).await;

    assert!(result.is_ok());
    node.assert_all().await;
}
