//! Fixtures and wiring shared by the integration tests.

use hub_core::{
    config::AppConfig,
    fetch::{FetcherConfig, HttpFetcher},
    repository::MemoryRepository,
    runtime::HubRuntime,
    settlement::MemorySettlement,
    store::MemoryStore,
    types::{Address, Node, NodeStatus},
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};

/// Address whose every byte is `byte`.
#[must_use]
pub fn address(byte: u8) -> Address {
    Address::new([byte; 20])
}

/// A registered node at `endpoint` running a current version.
#[must_use]
pub fn node(byte: u8, endpoint: &str) -> Node {
    Node {
        address: address(byte),
        endpoint: endpoint.to_string(),
        access_token: String::new(),
        version: "1.2.0".to_string(),
        status: NodeStatus::Registered,
        staking: 1_000.0,
        is_public_good: false,
        tax_rate_basis_points: 0,
    }
}

/// `GET /workers_status` payload; every `(network, worker)` pair is ready.
#[must_use]
pub fn workers_status_body(workers: &[(&str, &str)], rss: bool) -> Value {
    let decentralized: Vec<Value> = workers
        .iter()
        .map(|(network, worker)| {
            json!({
                "network": network,
                "worker": worker,
                "platform": "",
                "tags": [],
                "status": "Ready"
            })
        })
        .collect();
    let rss = rss.then(|| {
        json!({
            "network": "rss",
            "worker": "rsshub",
            "platform": "RSSHub",
            "tags": ["rss"],
            "status": "Ready"
        })
    });
    json!({"data": {"decentralized": decentralized, "rss": rss, "federated": []}})
}

/// Single-activity payload.
#[must_use]
pub fn activity_body(id: &str, network: &str) -> Value {
    json!({"data": activity(id, network, "0xowner")})
}

/// List payload over `ids`.
#[must_use]
pub fn activities_body(ids: &[&str], network: &str) -> Value {
    let data: Vec<Value> = ids.iter().map(|id| activity(id, network, "0xowner")).collect();
    json!({"data": data, "meta": {"cursor": null}})
}

/// An activity whose `from` differs from [`activity_body`]'s.
#[must_use]
pub fn tampered_activity(id: &str, network: &str) -> Value {
    let mut value = activity(id, network, "0xowner");
    value["from"] = json!("0xforged");
    value
}

fn activity(id: &str, network: &str, owner: &str) -> Value {
    json!({
        "id": id,
        "owner": owner,
        "network": network,
        "index": 0,
        "from": "0xsender",
        "to": "0xreceiver",
        "tag": "transaction",
        "type": "transfer",
        "platform": null,
        "actions": [{
            "tag": "transaction",
            "type": "transfer",
            "from": "0xsender",
            "to": "0xreceiver"
        }]
    })
}

/// Fetcher settings that keep retries quick.
#[must_use]
pub fn fast_fetcher_config() -> FetcherConfig {
    FetcherConfig {
        max_attempts: 2,
        retry_base_delay_ms: 5,
        request_timeout_ms: 2_000,
        ..FetcherConfig::default()
    }
}

/// A runtime over in-memory backends the test can inspect.
pub struct TestHub {
    pub runtime: HubRuntime,
    pub repository: Arc<MemoryRepository>,
    pub settlement: Arc<MemorySettlement>,
    pub store: Arc<MemoryStore>,
}

/// Builds a hub over `nodes` with fast retries.
///
/// # Panics
///
/// Panics if the runtime fails to build.
pub async fn hub(nodes: Vec<Node>) -> TestHub {
    hub_with(nodes, AppConfig::default()).await
}

/// [`hub`] with an explicit base configuration.
///
/// # Panics
///
/// Panics if the runtime fails to build.
#[allow(clippy::expect_used)]
pub async fn hub_with(nodes: Vec<Node>, mut config: AppConfig) -> TestHub {
    config.fetcher = fast_fetcher_config();
    let repository = Arc::new(MemoryRepository::with_nodes(nodes));
    let settlement = Arc::new(MemorySettlement::new());
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(HttpFetcher::new(config.fetcher.clone()).expect("http fetcher"));

    let runtime = HubRuntime::builder()
        .with_config(config)
        .with_repository(repository.clone())
        .with_settlement(settlement.clone())
        .with_store(store.clone())
        .with_fetcher(fetcher)
        .build()
        .await
        .expect("runtime builds");

    TestHub { runtime, repository, settlement, store }
}

/// Polls `condition` until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
