use anyhow::Result;
use axum::serve;
use hub_core::{config::AppConfig, metrics::MetricsCollector, runtime::HubRuntime};
use std::{future::IntoFuture, sync::Arc, time::Duration};
use tokio::{signal, sync::watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Graceful shutdown timeout in seconds.
/// After this timeout, in-flight requests are dropped.
const GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Initializes the logging system based on the configuration.
fn init_logging(config: &AppConfig) {
    let default_level = config.logging.level.as_str();
    let filter = if let Ok(env_filter) = std::env::var("RUST_LOG") {
        if env_filter == "debug" {
            EnvFilter::new("warn,hub_core=debug,server=debug,tests=debug")
        } else if env_filter == "trace" {
            EnvFilter::new("warn,hub_core=trace,server=trace,tests=trace")
        } else {
            EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| {
                EnvFilter::new("warn,hub_core=debug,server=debug,tests=debug")
            })
        }
    } else {
        EnvFilter::new(format!(
            "warn,hub_core={default_level},server={default_level},tests={default_level}"
        ))
    };

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer().json();
        registry.with(fmt_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config =
        AppConfig::load().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    init_logging(&config);
    info!(environment = %config.environment, "Starting node coordination hub");
    debug!(
        seed_nodes = config.seed_nodes.len(),
        node_count = config.distributor.node_count,
        bind_port = config.server.bind_port,
        "Configuration loaded"
    );

    let metrics = if config.metrics.enabled {
        Arc::new(MetricsCollector::with_prometheus())
    } else {
        Arc::new(MetricsCollector::new())
    };

    let runtime = HubRuntime::builder()
        .with_config(config.clone())
        .with_metrics(metrics)
        .enable_epoch_listener()
        .build()
        .await
        .map_err(|e| anyhow::anyhow!("Runtime initialization failed: {e}"))?;

    let app = server::create_app(&runtime, &config);
    let addr = config.socket_addr().map_err(|e| anyhow::anyhow!(e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Hub server listening");

    let (signalled_tx, mut signalled_rx) = watch::channel(false);
    let server = serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(true);
        })
        .into_future();
    let drain_deadline = async {
        let _ = signalled_rx.wait_for(|signalled| *signalled).await;
        tokio::time::sleep(Duration::from_secs(GRACEFUL_SHUTDOWN_TIMEOUT_SECS)).await;
    };

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!(error = %e, "Server error occurred");
            }
        }
        () = drain_deadline => {
            warn!("Graceful shutdown timed out, dropping in-flight requests");
        }
    }

    runtime.shutdown().await;
    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(
                error = %e,
                "Failed to install Ctrl+C handler"
            );
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(
                    error = %e,
                    "Failed to install signal handler"
                );

                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!(
        "Shutdown signal received, starting graceful shutdown (timeout: {}s)",
        GRACEFUL_SHUTDOWN_TIMEOUT_SECS
    );
}
