//! Runtime lifecycle management including background tasks and graceful shutdown.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{builder::HubRuntimeBuilder, HubComponents};
use crate::{
    config::AppConfig,
    distributor::Distributor,
    enforcer::{Enforcer, EpochListener},
    metrics::MetricsCollector,
};

/// Owns every component and the background tasks started for them.
///
/// [`HubRuntime::shutdown`] broadcasts the shutdown signal and waits for the
/// epoch listener to stop.
pub struct HubRuntime {
    components: HubComponents,
    shutdown_tx: broadcast::Sender<()>,
    config: AppConfig,
    epoch_task: Option<JoinHandle<()>>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl HubRuntime {
    #[must_use]
    pub fn builder() -> HubRuntimeBuilder {
        HubRuntimeBuilder::new()
    }

    pub(super) fn new(
        components: HubComponents,
        shutdown_tx: broadcast::Sender<()>,
        config: AppConfig,
        enable_epoch_listener: bool,
    ) -> Self {
        let epoch_task = enable_epoch_listener.then(|| {
            let listener = EpochListener::new(
                Arc::clone(components.enforcer()),
                Arc::clone(components.store()),
            );
            let handle = listener.start_with_shutdown(shutdown_tx.subscribe());
            debug!("Epoch listener task started");
            handle
        });

        Self {
            components,
            shutdown_tx,
            config,
            epoch_task,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn components(&self) -> &HubComponents {
        &self.components
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn distributor(&self) -> &Arc<Distributor> {
        self.components.distributor()
    }

    #[must_use]
    pub fn enforcer(&self) -> &Arc<Enforcer> {
        self.components.enforcer()
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        self.components.metrics()
    }

    /// Creates a new shutdown receiver for external shutdown coordination.
    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signals every background task and waits for the epoch listener.
    /// Idempotent.
    pub async fn shutdown(self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("Initiating hub runtime shutdown");
        if let Err(e) = self.shutdown_tx.send(()) {
            debug!(error = %e, "Shutdown signal had no receivers");
        }
        if let Some(epoch_task) = self.epoch_task {
            match epoch_task.await {
                Ok(()) => debug!("Epoch listener task completed"),
                Err(e) if e.is_cancelled() => debug!("Epoch listener task cancelled"),
                Err(e) => error!(error = %e, "Epoch listener task failed"),
            }
        }
        info!("Hub runtime shutdown complete");
    }

    /// Waits for a shutdown signal from any holder of
    /// [`HubRuntime::shutdown_receiver`]'s sender, then shuts down.
    pub async fn wait_for_shutdown(self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = shutdown_rx.recv().await;
        info!("Shutdown signal received, runtime terminating");
        self.shutdown().await;
    }

    /// Sender side of the shutdown channel, for signal handlers.
    #[must_use]
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}
    let _ = assert_send::<HubRuntime>;
    let _ = assert_sync::<HubRuntime>;
};
