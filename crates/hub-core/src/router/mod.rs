//! Fan-out router.
//!
//! A request goes to every selected node concurrently. The first response that
//! is valid and error-free is returned to the caller immediately; the rest of
//! the fan-out keeps running in the background and, once every node has
//! answered, the full response set is handed to a completion handler (the
//! enforcer's vote). If no node produced a winner the first error-free
//! response, or failing that the first response, is returned instead.

mod errors;

pub use errors::RouterError;

use arc_swap::ArcSwap;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinSet,
    time::Instant,
};
use tracing::{debug, warn};
use url::{form_urlencoded, Url};

use crate::{
    fetch::{FetchError, FetchRequest, Fetcher},
    metrics::MetricsCollector,
    payload::{self, Classification, PayloadKind},
    types::{Address, DataResponse, NodeEndpointCache},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// How long a caller waits for a winner before giving up.
    #[serde(default = "default_fanout_timeout_ms")]
    pub fanout_timeout_ms: u64,
}

fn default_fanout_timeout_ms() -> u64 {
    3_000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { fanout_timeout_ms: default_fanout_timeout_ms() }
    }
}

/// One leg of a fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRequest {
    pub address: Address,
    pub request: FetchRequest,
}

/// Invoked once with every node's response after the whole fan-out finished,
/// including when the caller already returned or timed out.
pub type CollectedHandler = Box<dyn FnOnce(Vec<DataResponse>) -> BoxFuture<'static, ()> + Send>;

/// Builds one URL per node: `endpoint + path + ?query`, with query keys in a
/// stable (sorted) order.
///
/// # Errors
///
/// Returns [`RouterError::InvalidEndpoint`] if a node endpoint is not an
/// absolute URL.
pub fn build_path(
    path: &str,
    query: &[(String, String)],
    nodes: &[NodeEndpointCache],
) -> Result<BTreeMap<Address, String>, RouterError> {
    let encoded = encode_query(query);
    let path = path.trim_start_matches('/');
    nodes
        .iter()
        .map(|node| {
            Url::parse(&node.endpoint)
                .map_err(|_| RouterError::InvalidEndpoint(node.endpoint.clone()))?;
            let mut url = format!("{}/{path}", node.endpoint.trim_end_matches('/'));
            if !encoded.is_empty() {
                url.push('?');
                url.push_str(&encoded);
            }
            Ok((node.address, url))
        })
        .collect()
}

/// Form-encodes `query` with keys sorted; repeated keys keep their order.
#[must_use]
pub fn encode_query(query: &[(String, String)]) -> String {
    let mut params: Vec<&(String, String)> = query.iter().collect();
    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
        .into_iter()
        .fold(form_urlencoded::Serializer::new(String::new()), |mut serializer, (k, v)| {
            serializer.append_pair(k, v);
            serializer
        })
        .finish()
}

/// Percent-encodes a single path segment, leaving RFC 3986 unreserved
/// characters as they are.
#[must_use]
pub fn encode_segment(raw: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(char::from(byte));
        } else {
            encoded.push('%');
            encoded.push(char::from(HEX[usize::from(byte >> 4)]));
            encoded.push(char::from(HEX[usize::from(byte & 0x0f)]));
        }
    }
    encoded
}

/// Pairs built URLs with each node's access token.
#[must_use]
pub fn node_requests(
    urls: BTreeMap<Address, String>,
    nodes: &[NodeEndpointCache],
) -> Vec<NodeRequest> {
    nodes
        .iter()
        .filter_map(|node| {
            urls.get(&node.address).map(|url| NodeRequest {
                address: node.address,
                request: FetchRequest::get(url.clone()).with_auth(&node.access_token),
            })
        })
        .collect()
}

pub struct Router {
    fetcher: Arc<dyn Fetcher>,
    config: ArcSwap<RouterConfig>,
    metrics: Arc<MetricsCollector>,
}

impl Router {
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        config: RouterConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self { fetcher, config: ArcSwap::from_pointee(config), metrics }
    }

    pub fn update_config(&self, config: RouterConfig) {
        self.config.store(Arc::new(config));
    }

    /// Fans `requests` out and returns the winning response.
    ///
    /// `on_all_collected` runs exactly once, after every node answered,
    /// regardless of what the caller observed.
    ///
    /// # Errors
    ///
    /// - [`RouterError::NoNodes`] for an empty request set
    /// - [`RouterError::Timeout`] if nothing was published before the deadline
    /// - [`RouterError::Node`] if the fallback response carries an error
    pub async fn distribute(
        &self,
        requests: Vec<NodeRequest>,
        on_all_collected: CollectedHandler,
    ) -> Result<DataResponse, RouterError> {
        self.distribute_as(requests, PayloadKind::Activity, on_all_collected).await
    }

    /// [`Router::distribute`] with an explicit payload expectation.
    ///
    /// # Errors
    ///
    /// See [`Router::distribute`].
    pub async fn distribute_as(
        &self,
        requests: Vec<NodeRequest>,
        kind: PayloadKind,
        on_all_collected: CollectedHandler,
    ) -> Result<DataResponse, RouterError> {
        if requests.is_empty() {
            return Err(RouterError::NoNodes);
        }

        let started = Instant::now();
        let deadline = Duration::from_millis(self.config.load().fanout_timeout_ms);
        let node_count = requests.len();
        self.metrics.record_fanout(node_count);

        // Single-slot rendezvous: only the first winner is ever observed.
        let (winner_tx, mut winner_rx) = mpsc::channel::<DataResponse>(1);
        let (fallback_tx, fallback_rx) = oneshot::channel::<DataResponse>();

        let mut tasks = JoinSet::new();
        for node_request in requests {
            let fetcher = Arc::clone(&self.fetcher);
            let winner_tx = winner_tx.clone();
            tasks.spawn(async move {
                let response = fetch_and_classify(fetcher.as_ref(), node_request, kind).await;
                if response.is_winner() {
                    let _ = winner_tx.try_send(response.clone());
                }
                response
            });
        }
        drop(winner_tx);

        tokio::spawn(async move {
            let mut collected = Vec::with_capacity(node_count);
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(response) => collected.push(response),
                    Err(e) => warn!(error = %e, "fan-out task did not complete"),
                }
            }
            if let Some(fallback) = fallback_response(&collected) {
                let _ = fallback_tx.send(fallback);
            }
            on_all_collected(collected).await;
        });

        let outcome = tokio::time::timeout(deadline, async {
            if let Some(winner) = winner_rx.recv().await {
                return Some((winner, "winner"));
            }
            // The channel only closes once every task finished without a winner.
            fallback_rx.await.ok().map(|fallback| (fallback, "fallback"))
        })
        .await;

        match outcome {
            Ok(Some((response, kind))) => match &response.err {
                Some(err) => {
                    self.metrics.record_fanout_outcome("error", started.elapsed());
                    debug!(
                        node = %response.address,
                        error = %err,
                        "fan-out produced no usable response"
                    );
                    Err(RouterError::Node { address: response.address, source: err.clone() })
                }
                None => {
                    self.metrics.record_fanout_outcome(kind, started.elapsed());
                    debug!(
                        node = %response.address,
                        outcome = kind,
                        valid = response.valid,
                        "fan-out resolved"
                    );
                    Ok(response)
                }
            },
            Ok(None) => {
                self.metrics.record_fanout_outcome("error", started.elapsed());
                Err(RouterError::NoResponses)
            }
            Err(_) => {
                self.metrics.record_fanout_outcome("timeout", started.elapsed());
                warn!(nodes = node_count, timeout_ms = deadline.as_millis(), "fan-out timed out");
                Err(RouterError::Timeout)
            }
        }
    }
}

/// First error-free response in completion order, else the first response.
fn fallback_response(collected: &[DataResponse]) -> Option<DataResponse> {
    collected.iter().find(|r| !r.is_err()).or_else(|| collected.first()).cloned()
}

async fn fetch_and_classify(
    fetcher: &dyn Fetcher,
    node_request: NodeRequest,
    kind: PayloadKind,
) -> DataResponse {
    let NodeRequest { address, request } = node_request;
    match fetcher.fetch(&request).await {
        Ok(body) => classify_body(address, request.url, body, kind),
        Err(e) => DataResponse::failure(address, request.url, None, e),
    }
}

fn classify_body(
    address: Address,
    endpoint: String,
    body: Bytes,
    kind: PayloadKind,
) -> DataResponse {
    match payload::classify_as(kind, &body) {
        Ok(Classification::Valid) => DataResponse::success(address, endpoint, body, true),
        Ok(Classification::Empty) => DataResponse::success(address, endpoint, body, false),
        Err(e) => {
            let error = FetchError::InvalidPayload(e.to_string());
            DataResponse::failure(address, endpoint, Some(body), error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::FutureExt;
    use std::collections::HashMap;

    struct ScriptedFetcher {
        // url prefix -> (delay, outcome)
        script: HashMap<String, (u64, Result<&'static str, FetchError>)>,
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, request: &FetchRequest) -> Result<Bytes, FetchError> {
            let (delay, outcome) = self
                .script
                .iter()
                .find(|(prefix, _)| request.url.starts_with(prefix.as_str()))
                .map(|(_, entry)| entry.clone())
                .unwrap_or((0, Err(FetchError::NoResult)));
            tokio::time::sleep(Duration::from_millis(delay)).await;
            outcome.map(|s| Bytes::from_static(s.as_bytes()))
        }
    }

    const VALID: &str = r#"{"data":{"id":"0x1","network":"ethereum"}}"#;
    const EMPTY: &str = r#"{"data":null}"#;

    fn node(byte: u8) -> NodeEndpointCache {
        NodeEndpointCache {
            address: Address::new([byte; 20]),
            endpoint: format!("http://node-{byte}"),
            access_token: String::new(),
            score: 1.0,
            invalid_count: 0,
        }
    }

    fn router(script: Vec<(u8, u64, Result<&'static str, FetchError>)>, timeout_ms: u64) -> Router {
        let script = script
            .into_iter()
            .map(|(byte, delay, outcome)| (format!("http://node-{byte}/"), (delay, outcome)))
            .collect();
        Router::new(
            Arc::new(ScriptedFetcher { script }),
            RouterConfig { fanout_timeout_ms: timeout_ms },
            Arc::new(MetricsCollector::new()),
        )
    }

    fn requests(bytes: &[u8]) -> Vec<NodeRequest> {
        let nodes: Vec<_> = bytes.iter().map(|b| node(*b)).collect();
        node_requests(build_path("/decentralized/tx/0x1", &[], &nodes).unwrap(), &nodes)
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

    #[test]
    fn build_path_sorts_query_and_joins_cleanly() {
        let mut trailing = node(1);
        trailing.endpoint = "http://node-1/".to_string();
        let query = vec![
            ("limit".to_string(), "10".to_string()),
            ("action_limit".to_string(), "5".to_string()),
            ("tag".to_string(), "social post".to_string()),
        ];
        let urls = build_path("/decentralized/0xabc", &query, &[trailing]).unwrap();
        assert_eq!(
            urls[&Address::new([1; 20])],
            "http://node-1/decentralized/0xabc?action_limit=5&limit=10&tag=social+post"
        );
    }

    #[test]
    fn segments_are_percent_encoded() {
        assert_eq!(encode_segment("0xAbC-1.2_~"), "0xAbC-1.2_~");
        assert_eq!(encode_segment("vitalik.eth/x y"), "vitalik.eth%2Fx%20y");
        assert_eq!(encode_segment("é"), "%C3%A9");
    }

    #[test]
    fn build_path_omits_empty_query_and_rejects_bad_endpoints() {
        let urls = build_path("rss/abc", &[], &[node(2)]).unwrap();
        assert_eq!(urls[&Address::new([2; 20])], "http://node-2/rss/abc");

        let mut bad = node(3);
        bad.endpoint = "not a url".to_string();
        assert!(matches!(build_path("/x", &[], &[bad]), Err(RouterError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn first_valid_response_wins_before_slow_nodes_finish() {
        let router =
            router(vec![(1, 200, Ok(VALID)), (2, 10, Ok(VALID)), (3, 400, Ok(VALID))], 1_000);
        let (handler, collected) = capture();

        let started = std::time::Instant::now();
        let winner = router.distribute(requests(&[1, 2, 3]), handler).await.unwrap();
        assert_eq!(winner.address, Address::new([2; 20]));
        assert!(started.elapsed() < Duration::from_millis(200));

        let all = collected.await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].address, Address::new([2; 20]));
    }

    #[tokio::test]
    async fn empty_response_is_used_when_nothing_is_valid() {
        let failing = Err(FetchError::Status(500, "x".into()));
        let router = router(vec![(1, 5, failing), (2, 20, Ok(EMPTY))], 1_000);
        let (handler, collected) = capture();

        let response = router.distribute(requests(&[1, 2]), handler).await.unwrap();
        assert_eq!(response.address, Address::new([2; 20]));
        assert!(!response.valid);
        assert_eq!(collected.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn all_errors_surface_the_first_error() {
        let script = vec![(1, 5, Err(FetchError::NoResult)), (2, 30, Err(FetchError::Timeout))];
        let router = router(script, 1_000);
        let (handler, _collected) = capture();

        let error = router.distribute(requests(&[1, 2]), handler).await.unwrap_err();
        assert!(error.is_no_result());
    }

    #[tokio::test]
    async fn error_coded_payload_is_never_a_winner() {
        let coded = r#"{"error":"boom","error_code":"internal_error"}"#;
        let router = router(vec![(1, 1, Ok(coded)), (2, 30, Ok(VALID))], 1_000);
        let (handler, collected) = capture();

        let winner = router.distribute(requests(&[1, 2]), handler).await.unwrap();
        assert_eq!(winner.address, Address::new([2; 20]));

        let all = collected.await.unwrap();
        let errored = all.iter().find(|r| r.address == Address::new([1; 20])).unwrap();
        assert!(matches!(errored.err, Some(FetchError::InvalidPayload(_))));
    }

    #[tokio::test]
    async fn deadline_returns_retryable_timeout_and_still_collects() {
        let router = router(vec![(1, 300, Ok(VALID))], 50);
        let (handler, collected) = capture();

        let error = router.distribute(requests(&[1]), handler).await.unwrap_err();
        assert_eq!(error, RouterError::Timeout);
        assert!(error.is_retryable());
        assert_eq!(collected.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn raw_payloads_win_without_parsing() {
        let router =
            router(vec![(1, 5, Ok("")), (2, 10, Ok("<rss version=\"2.0\"></rss>"))], 1_000);
        let (handler, _collected) = capture();

        let winner =
            router.distribute_as(requests(&[1, 2]), PayloadKind::Raw, handler).await.unwrap();
        assert_eq!(winner.address, Address::new([2; 20]));
        assert!(winner.valid);
    }

    #[tokio::test]
    async fn empty_request_set_is_rejected() {
        let router = router(vec![], 50);
        let (handler, _collected) = capture();
        assert_eq!(router.distribute(Vec::new(), handler).await.unwrap_err(), RouterError::NoNodes);
    }
}
