use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;
use tracing::{trace, warn};

use super::{FetchError, FetchRequest, Fetcher, Method};

/// Configuration for outbound node requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Maximum number of in-flight node requests across the process.
    #[serde(default = "default_concurrent_limit")]
    pub concurrent_limit: usize,

    /// How long a request may wait for a concurrency permit.
    #[serde(default = "default_permit_timeout_ms")]
    pub permit_timeout_ms: u64,

    /// Per-attempt request timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Total attempts per request including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential backoff between attempts.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_concurrent_limit() -> usize {
    512
}

fn default_permit_timeout_ms() -> u64 {
    500
}

fn default_request_timeout_ms() -> u64 {
    2_500
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            concurrent_limit: default_concurrent_limit(),
            permit_timeout_ms: default_permit_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

/// `reqwest`-backed [`Fetcher`] with a process-wide concurrency cap.
pub struct HttpFetcher {
    client: Client,
    permits: Arc<Semaphore>,
    config: FetcherConfig,
}

impl HttpFetcher {
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the underlying client cannot be built.
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .connect_timeout(Duration::from_secs(3))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::limited(3))
            .user_agent(concat!("hub/", env!("CARGO_PKG_VERSION")))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                FetchError::Transport(format!("client build failed: {e}"))
            })?;

        Ok(Self { client, permits: Arc::new(Semaphore::new(config.concurrent_limit)), config })
    }

    fn sanitize(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_body() {
            "response body error".to_string()
        } else if error.is_redirect() {
            "too many redirects".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else {
            "network error".to_string()
        }
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<Bytes, FetchError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self
                .client
                .post(&request.url)
                .header("content-type", "application/json")
                .body(request.body.clone().unwrap_or_default()),
        };
        if let Some(token) = &request.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .timeout(Duration::from_millis(self.config.request_timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Transport(Self::sanitize(&e))
                }
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NoResult);
        }
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("unexpected status").to_string();
            return Err(FetchError::Status(status.as_u16(), reason));
        }

        response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Transport(Self::sanitize(&e))
            }
        })
    }

    #[cfg(test)]
    fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Bytes, FetchError> {
        let _permit = tokio::time::timeout(
            Duration::from_millis(self.config.permit_timeout_ms),
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| {
            warn!(
                url = %request.url,
                available_permits = self.permits.available_permits(),
                "fetch permit acquisition timed out"
            );
            FetchError::Timeout
        })?
        .map_err(|_| FetchError::Canceled)?;

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(request).await {
                Ok(body) => {
                    trace!(url = %request.url, attempt, bytes = body.len(), "fetch completed");
                    return Ok(body);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    trace!(url = %request.url, attempt, error = %e, "fetch failed, retrying");
                    let delay = self.config.retry_base_delay_ms * (1 << (attempt - 1));
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => {
                    trace!(url = %request.url, attempt, error = %e, "fetch failed");
                    return Err(e);
                }
            }
        }
    }
}
