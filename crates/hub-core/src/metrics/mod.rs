//! Prometheus metrics for the hub.
//!
//! Every record call writes straight to the `metrics` facade, which is a
//! no-op until a recorder is installed. A small aggregate snapshot is kept on
//! the side for the health endpoint; it is updated with `try_lock` so a
//! contended snapshot never slows a fan-out.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{sync::OnceLock, time::Duration};

use crate::types::{Epoch, NodeClass, NodeStatus};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn prometheus_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "failed to install Prometheus recorder, using detached recorder"
                );
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Aggregate counters exposed on the health endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HubMetrics {
    pub fanouts: u64,
    pub fanout_timeouts: u64,
    pub valid_points: u64,
    pub invalid_points: u64,
    pub demotions: u64,
    pub last_epoch: Option<Epoch>,
    pub full_nodes: usize,
    pub rss_nodes: usize,
}

#[derive(Default)]
pub struct MetricsCollector {
    snapshot: Mutex<HubMetrics>,
    prometheus: Option<PrometheusHandle>,
}

impl MetricsCollector {
    /// Collector without an exporter; records go to whatever recorder is
    /// installed globally, if any.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collector backed by the process-wide Prometheus recorder.
    #[must_use]
    pub fn with_prometheus() -> Self {
        Self { snapshot: Mutex::new(HubMetrics::default()), prometheus: Some(prometheus_handle()) }
    }

    /// Prometheus text exposition, if an exporter is attached.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.prometheus.as_ref().map(PrometheusHandle::render)
    }

    #[must_use]
    pub fn snapshot(&self) -> HubMetrics {
        self.snapshot.lock().clone()
    }

    fn update(&self, f: impl FnOnce(&mut HubMetrics)) {
        if let Some(mut snapshot) = self.snapshot.try_lock() {
            f(&mut snapshot);
        }
    }

    pub fn record_fanout(&self, nodes: usize) {
        counter!("hub_fanouts_total").increment(1);
        #[allow(clippy::cast_precision_loss)]
        let nodes = nodes as f64;
        histogram!("hub_fanout_nodes").record(nodes);
        self.update(|m| m.fanouts += 1);
    }

    /// `outcome` is one of `winner`, `fallback`, `error` or `timeout`.
    pub fn record_fanout_outcome(&self, outcome: &'static str, elapsed: Duration) {
        counter!("hub_fanout_outcomes_total", "outcome" => outcome).increment(1);
        histogram!("hub_fanout_duration_seconds", "outcome" => outcome)
            .record(elapsed.as_secs_f64());
        if outcome == "timeout" {
            self.update(|m| m.fanout_timeouts += 1);
        }
    }

    pub fn record_votes(&self, valid_points: u64, invalid_points: u64) {
        counter!("hub_valid_points_total").increment(valid_points);
        counter!("hub_invalid_points_total").increment(invalid_points);
        self.update(|m| {
            m.valid_points += valid_points;
            m.invalid_points += invalid_points;
        });
    }

    pub fn record_demotions(&self, count: usize) {
        counter!("hub_demotions_total").increment(count as u64);
        self.update(|m| m.demotions += count as u64);
    }

    pub fn record_partial_check(&self, outcome: &'static str) {
        counter!("hub_partial_checks_total", "outcome" => outcome).increment(1);
    }

    pub fn record_probe(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        counter!("hub_probes_total", "outcome" => outcome).increment(1);
    }

    pub fn record_status_transition(&self, from: NodeStatus, to: NodeStatus) {
        counter!("hub_status_transitions_total", "from" => from.as_str(), "to" => to.as_str())
            .increment(1);
    }

    pub fn record_epoch(&self, epoch: Epoch, elapsed: Duration) {
        #[allow(clippy::cast_precision_loss)]
        let epoch_value = epoch as f64;
        gauge!("hub_epoch").set(epoch_value);
        histogram!("hub_epoch_maintenance_seconds").record(elapsed.as_secs_f64());
        self.update(|m| m.last_epoch = Some(epoch));
    }

    pub fn record_index_size(&self, class: NodeClass, size: usize) {
        #[allow(clippy::cast_precision_loss)]
        let size_value = size as f64;
        gauge!("hub_qualified_nodes", "class" => class.as_str()).set(size_value);
        self.update(|m| match class {
            NodeClass::Full => m.full_nodes = size,
            NodeClass::Rss => m.rss_nodes = size,
        });
    }

    pub fn record_index_rebuild(&self, class: NodeClass) {
        counter!("hub_index_rebuilds_total", "class" => class.as_str()).increment(1);
    }
}
