use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use hub_core::{
    distributor::{
        AccountQuery, ActivityQuery, Distributor, DistributorError, NetworkActivitiesQuery,
        PlatformActivitiesQuery,
    },
    enforcer::Enforcer,
    metrics::MetricsCollector,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

type Pairs = Query<Vec<(String, String)>>;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub distributor: Arc<Distributor>,
    pub enforcer: Arc<Enforcer>,
    pub metrics: Arc<MetricsCollector>,
}

/// Maps a [`DistributorError`] onto an HTTP status and a JSON error body.
pub struct ApiError(pub DistributorError);

impl From<DistributorError> for ApiError {
    fn from(error: DistributorError) -> Self {
        Self(error)
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.0 {
            DistributorError::NoResults => StatusCode::NOT_FOUND,
            DistributorError::NoQualifiedNodes => StatusCode::SERVICE_UNAVAILABLE,
            DistributorError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            DistributorError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    fn code(&self) -> &'static str {
        match self.0 {
            DistributorError::NoResults => "NO_RESULTS",
            DistributorError::NoQualifiedNodes => "NO_QUALIFIED_NODES",
            DistributorError::Timeout => "TIMEOUT",
            DistributorError::InvalidQuery(_) => "INVALID_QUERY",
            _ => "UPSTREAM_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::BAD_GATEWAY {
            warn!(error = %self.0, "read request failed");
        } else {
            debug!(error = %self.0, status = status.as_u16(), "read request rejected");
        }
        let body = json!({ "error": self.0.to_string(), "error_code": self.code() });
        (status, Json(body)).into_response()
    }
}

fn json_payload(body: Bytes) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// RSS bodies are passed through; XML feeds keep an XML content type.
fn rss_payload(body: Bytes) -> Response {
    let content_type = if body.trim_ascii_start().starts_with(b"<") {
        "application/xml; charset=utf-8"
    } else {
        "application/json"
    };
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

/// `GET /decentralized/tx/{id}`
///
/// # Errors
///
/// See [`ApiError`].
pub async fn handle_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(pairs): Pairs,
) -> Result<Response, ApiError> {
    let query = ActivityQuery::from_pairs(&id, &pairs)?;
    Ok(json_payload(state.distributor.route_by_id(&query).await?))
}

/// `GET /decentralized/{account}`
///
/// # Errors
///
/// See [`ApiError`].
pub async fn handle_account_activities(
    State(state): State<AppState>,
    Path(account): Path<String>,
    Query(pairs): Pairs,
) -> Result<Response, ApiError> {
    let query = AccountQuery::from_pairs(&account, &pairs)?;
    Ok(json_payload(state.distributor.route_by_account(&query).await?))
}

/// `GET /decentralized/network/{network}`
///
/// # Errors
///
/// See [`ApiError`].
pub async fn handle_network_activities(
    State(state): State<AppState>,
    Path(network): Path<String>,
    Query(pairs): Pairs,
) -> Result<Response, ApiError> {
    let query = NetworkActivitiesQuery::from_pairs(&network, &pairs)?;
    Ok(json_payload(state.distributor.route_by_network(&query).await?))
}

/// `GET /decentralized/platform/{platform}`
///
/// # Errors
///
/// See [`ApiError`].
pub async fn handle_platform_activities(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(pairs): Pairs,
) -> Result<Response, ApiError> {
    let query = PlatformActivitiesQuery::from_pairs(&platform, &pairs)?;
    Ok(json_payload(state.distributor.route_by_platform(&query).await?))
}

/// `GET /rss/{*path}`
///
/// # Errors
///
/// See [`ApiError`].
pub async fn handle_rss(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(pairs): Pairs,
) -> Result<Response, ApiError> {
    Ok(rss_payload(state.distributor.route_rss(&path, &pairs).await?))
}

#[allow(clippy::unused_async)]
pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "metrics exporter disabled".to_string(),
        ),
    }
}

#[allow(clippy::unused_async)]
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    let healthy = snapshot.full_nodes > 0 || snapshot.rss_nodes > 0;

    let health_status = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "epoch": state.enforcer.current_epoch(),
        "qualified_nodes": {
            "full": snapshot.full_nodes,
            "rss": snapshot.rss_nodes,
        },
        "votes": {
            "valid_points": snapshot.valid_points,
            "invalid_points": snapshot.invalid_points,
            "demotions": snapshot.demotions,
        },
        "fanouts": {
            "total": snapshot.fanouts,
            "timeouts": snapshot.fanout_timeouts,
        },
    });

    (
        if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE },
        Json(health_status),
    )
}
