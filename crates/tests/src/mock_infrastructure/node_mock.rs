//! Data node mock built on mockito.

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::Value;

/// A mock data node. Mocks live as long as the builder.
pub struct NodeMockBuilder {
    server: ServerGuard,
    mocks: Vec<Mock>,
}

impl NodeMockBuilder {
    /// Creates a node backed by a fresh mockito server.
    pub async fn new() -> Self {
        Self { server: Server::new_async().await, mocks: Vec::new() }
    }

    /// Endpoint to register the node under.
    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Mocks `GET /workers_status`.
    pub async fn mock_workers_status(&mut self, body: &Value) -> &mut Self {
        self.mock_json("/workers_status", 200, &body.to_string()).await
    }

    /// Mocks `GET /workers_status` requiring a bearer token.
    pub async fn mock_workers_status_with_auth(&mut self, token: &str, body: &Value) -> &mut Self {
        let mock = self
            .server
            .mock("GET", "/workers_status")
            .match_header("authorization", format!("Bearer {token}").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;
        self.mocks.push(mock);
        self
    }

    /// Mocks `GET /decentralized/tx/{id}` with any query string.
    pub async fn mock_activity(&mut self, id: &str, body: &Value) -> &mut Self {
        self.mock_json(&format!("/decentralized/tx/{id}"), 200, &body.to_string()).await
    }

    /// Mocks `GET /decentralized/{account}` with any query string.
    pub async fn mock_account(&mut self, account: &str, body: &Value) -> &mut Self {
        self.mock_json(&format!("/decentralized/{account}"), 200, &body.to_string()).await
    }

    /// Mocks `GET /rss/{path}` returning a raw body.
    pub async fn mock_rss(&mut self, path: &str, body: &str) -> &mut Self {
        let mock = self
            .server
            .mock("GET", format!("/rss/{path}").as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(body)
            .create_async()
            .await;
        self.mocks.push(mock);
        self
    }

    /// Mocks `path` answering with a bare status code.
    pub async fn mock_status(&mut self, path: &str, status: usize) -> &mut Self {
        self.mock_json(path, status, "").await
    }

    /// Mocks `path` answering `status` exactly `hits` times; later requests
    /// fall through to mocks created afterwards.
    pub async fn mock_status_times(&mut self, path: &str, status: usize, hits: usize) -> &mut Self {
        let mock = self
            .server
            .mock("GET", path)
            .match_query(Matcher::Any)
            .with_status(status)
            .expect(hits)
            .create_async()
            .await;
        self.mocks.push(mock);
        self
    }

    async fn mock_json(&mut self, path: &str, status: usize, body: &str) -> &mut Self {
        let mock = self
            .server
            .mock("GET", path)
            .match_query(Matcher::Any)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;
        self.mocks.push(mock);
        self
    }

    /// Asserts every mock was hit as often as it expected.
    pub async fn assert_all(&self) {
        for mock in &self.mocks {
            mock.assert_async().await;
        }
    }
}
