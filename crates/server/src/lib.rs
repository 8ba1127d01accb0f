//! HTTP front end for the hub: public read routes backed by the
//! [`Distributor`](hub_core::distributor::Distributor), plus health and
//! metrics endpoints.

pub mod router;

use axum::{routing::get, Router};
use hub_core::{config::AppConfig, runtime::HubRuntime};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub use router::AppState;

/// Builds the axum application over `runtime`'s components.
pub fn create_app(runtime: &HubRuntime, config: &AppConfig) -> Router {
    let state = AppState {
        distributor: Arc::clone(runtime.distributor()),
        enforcer: Arc::clone(runtime.enforcer()),
        metrics: Arc::clone(runtime.metrics()),
    };
    create_router(state, config)
}

/// Routes and layers over an explicit [`AppState`].
pub fn create_router(state: AppState, config: &AppConfig) -> Router {
    let public = Router::new()
        .route("/health", get(router::handle_health))
        .route("/metrics", get(router::handle_metrics))
        .with_state(state.clone());

    let reads = Router::new()
        .route("/decentralized/tx/{id}", get(router::handle_activity))
        .route("/decentralized/network/{network}", get(router::handle_network_activities))
        .route("/decentralized/platform/{platform}", get(router::handle_platform_activities))
        .route("/decentralized/{account}", get(router::handle_account_activities))
        .route("/rss/{*path}", get(router::handle_rss))
        .with_state(state)
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests));

    public.merge(reads).layer(TraceLayer::new_for_http())
}
