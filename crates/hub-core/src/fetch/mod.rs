//! Outbound requests to nodes.
//!
//! Everything that talks to a node goes through the [`Fetcher`] trait so the
//! router, the partial cross-check and the epoch probe can be driven by a
//! test double.

pub mod errors;
pub mod http_client;

pub use errors::FetchError;
pub use http_client::{FetcherConfig, HttpFetcher};

use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    /// Bearer token presented to the node, if it requires one.
    pub auth_token: Option<String>,
    pub body: Option<Bytes>,
}

impl FetchRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: Method::Get, url: url.into(), auth_token: None, body: None }
    }

    #[must_use]
    pub fn post(url: impl Into<String>, body: Bytes) -> Self {
        Self { method: Method::Post, url: url.into(), auth_token: None, body: Some(body) }
    }

    /// Attaches a bearer token; empty tokens are ignored.
    #[must_use]
    pub fn with_auth(mut self, token: &str) -> Self {
        if !token.is_empty() {
            self.auth_token = Some(token.to_string());
        }
        self
    }
}

/// Issues a request to a node and returns the raw body.
///
/// A 404 maps to [`FetchError::NoResult`]; any other non-success status or
/// transport failure is retried before being surfaced.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<Bytes, FetchError>;
}
