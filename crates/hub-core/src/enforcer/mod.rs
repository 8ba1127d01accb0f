//! Enforcer: the scoring and epoch-maintenance authority.
//!
//! - [`voting`] turns one fan-out's responses into valid/invalid points.
//! - [`scoring`] derives a node's reliability score from its [`Stat`].
//! - [`epoch`] probes every node at each epoch boundary, moves nodes through
//!   their lifecycle and rebuilds the qualified index and capability maps.
//! - [`partial`] cross-checks account queries against secondary nodes.

pub mod capability;
pub mod config;
pub mod epoch;
mod errors;
pub mod identity;
mod partial;
pub mod scoring;
#[cfg(test)]
mod testing;
pub mod voting;
pub mod workers_status;

pub use capability::{CapabilityRegistry, WorkerCapabilities};
pub use config::EnforcerConfig;
pub use epoch::{announce_epoch, next_status, EpochListener, EpochReport};
pub use errors::EnforcerError;
pub use identity::{IdentityChecker, ResponseShape};
pub use scoring::{ReliabilityScore, ReliabilityScorer, ScoringConfig};

use arc_swap::ArcSwap;
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    fetch::Fetcher,
    index::QualifiedNodeIndex,
    metrics::MetricsCollector,
    repository::{stats_for, NodeRepository},
    settlement::{Demotion, SettlementClient},
    store::{keys, BackingStore},
    types::{Address, DataResponse, Epoch, InvalidReason, NodeInvalidResponse},
};

/// Collaborators the enforcer reads from and writes to.
pub struct EnforcerDeps {
    pub index: Arc<QualifiedNodeIndex>,
    pub repository: Arc<dyn NodeRepository>,
    pub store: Arc<dyn BackingStore>,
    pub settlement: Arc<dyn SettlementClient>,
    pub fetcher: Arc<dyn Fetcher>,
    pub capabilities: Arc<CapabilityRegistry>,
    pub metrics: Arc<MetricsCollector>,
}

/// Points earned by one node for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Outcome {
    pub address: Address,
    pub valid_point: u64,
    pub invalid_point: u64,
    pub reason: Option<InvalidReason>,
    pub response: Option<String>,
}

impl Outcome {
    fn from_response(response: &DataResponse) -> Self {
        let reason = (response.invalid_point > 0).then(|| {
            if response.is_err() {
                InvalidReason::Error
            } else {
                InvalidReason::Disagreement
            }
        });
        Self {
            address: response.address,
            valid_point: u64::from(response.valid_point),
            invalid_point: u64::from(response.invalid_point),
            reason,
            response: response.data.as_ref().map(|d| String::from_utf8_lossy(d).into_owned()),
        }
    }
}

pub struct Enforcer {
    config: ArcSwap<EnforcerConfig>,
    identity: ArcSwap<IdentityChecker>,
    scorer: ReliabilityScorer,
    index: Arc<QualifiedNodeIndex>,
    repository: Arc<dyn NodeRepository>,
    store: Arc<dyn BackingStore>,
    settlement: Arc<dyn SettlementClient>,
    fetcher: Arc<dyn Fetcher>,
    capabilities: Arc<CapabilityRegistry>,
    metrics: Arc<MetricsCollector>,
    current_epoch: AtomicU64,
    /// Last fully maintained epoch; held across a pass so passes never overlap.
    maintained: Mutex<Option<Epoch>>,
    /// Held from reading stats until they are saved. Votes and the epoch reset
    /// never interleave.
    stats_guard: Mutex<()>,
}

impl Enforcer {
    /// # Errors
    ///
    /// Returns [`EnforcerError::Config`] if `config` does not validate.
    pub fn new(
        config: EnforcerConfig,
        scoring: ScoringConfig,
        deps: EnforcerDeps,
    ) -> Result<Self, EnforcerError> {
        config.validate().map_err(EnforcerError::Config)?;
        let EnforcerDeps { index, repository, store, settlement, fetcher, capabilities, metrics } =
            deps;

        Ok(Self {
            identity: ArcSwap::from_pointee(IdentityChecker::new(&config.mutable_platforms)),
            scorer: ReliabilityScorer::new(scoring, config.demotion_threshold),
            config: ArcSwap::from_pointee(config),
            index,
            repository,
            store,
            settlement,
            fetcher,
            capabilities,
            metrics,
            current_epoch: AtomicU64::new(0),
            maintained: Mutex::new(None),
            stats_guard: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn config(&self) -> Arc<EnforcerConfig> {
        self.config.load_full()
    }

    /// Applies new settings; the demotion threshold is fixed at construction.
    ///
    /// # Errors
    ///
    /// Returns [`EnforcerError::Config`] if `config` does not validate.
    pub fn update_config(&self, config: EnforcerConfig) -> Result<(), EnforcerError> {
        config.validate().map_err(EnforcerError::Config)?;
        self.identity.store(Arc::new(IdentityChecker::new(&config.mutable_platforms)));
        self.config.store(Arc::new(config));
        Ok(())
    }

    #[must_use]
    pub fn current_epoch(&self) -> Epoch {
        self.current_epoch.load(Ordering::Acquire)
    }

    /// Seeds the epoch used for counters before the first maintenance pass.
    pub fn set_current_epoch(&self, epoch: Epoch) {
        self.current_epoch.store(epoch, Ordering::Release);
    }

    #[must_use]
    pub fn capabilities(&self) -> &Arc<CapabilityRegistry> {
        &self.capabilities
    }

    #[must_use]
    pub fn scorer(&self) -> &ReliabilityScorer {
        &self.scorer
    }

    /// Votes over a complete fan-out and applies the outcome to every node's
    /// stats, the request counters, the audit log and the qualified index.
    ///
    /// # Errors
    ///
    /// Returns the first persistence, store, index or settlement failure.
    pub async fn verify_responses(
        &self,
        request: &str,
        shape: ResponseShape,
        mut responses: Vec<DataResponse>,
    ) -> Result<Vec<DataResponse>, EnforcerError> {
        if responses.is_empty() {
            return Ok(responses);
        }

        voting::sort_by_validity(&mut responses);
        let identity = self.identity.load();
        voting::assign_points(&mut responses, |a, b| identity.responses_identical(a, b, shape));

        let points: Vec<_> = responses.iter().map(|r| (r.valid_point, r.invalid_point)).collect();
        debug!(request = %request, points = ?points, "responses voted");

        let outcomes: Vec<Outcome> = responses.iter().map(Outcome::from_response).collect();
        self.apply_outcomes(request, &outcomes).await?;
        Ok(responses)
    }

    pub(crate) async fn apply_outcomes(
        &self,
        request: &str,
        outcomes: &[Outcome],
    ) -> Result<(), EnforcerError> {
        let guard = self.stats_guard.lock().await;
        let epoch = self.current_epoch();
        let threshold = self.scorer.demotion_threshold();
        let now = Utc::now();

        let addresses: Vec<Address> = outcomes.iter().map(|o| o.address).collect();
        let mut stats: HashMap<Address, _> = stats_for(self.repository.as_ref(), addresses)
            .await?
            .into_iter()
            .map(|stat| (stat.address, stat))
            .collect();

        let mut demotions = Vec::new();
        let mut counters = Vec::new();
        let mut records = Vec::new();
        let (mut valid_total, mut invalid_total) = (0, 0);

        for outcome in outcomes {
            let Some(stat) = stats.get_mut(&outcome.address) else {
                warn!(node = %outcome.address, "no stats for responding node, skipping");
                continue;
            };

            let before = stat.epoch_invalid_request;
            stat.apply_points(outcome.valid_point, outcome.invalid_point);
            stat.score = self.scorer.score(stat, now);
            if before < threshold && stat.epoch_invalid_request >= threshold {
                warn!(
                    node = %outcome.address,
                    epoch_invalid = stat.epoch_invalid_request,
                    "node reached demotion threshold"
                );
                demotions.push(Demotion {
                    address: outcome.address,
                    reason: format!(
                        "{} invalid responses in epoch {epoch}",
                        stat.epoch_invalid_request
                    ),
                });
            }

            if outcome.valid_point > 0 {
                let increment = i64::try_from(outcome.valid_point).unwrap_or(i64::MAX);
                counters.push((keys::epoch_requests(epoch, &outcome.address), increment));
            }
            if let Some(reason) = outcome.reason {
                for _ in 0..outcome.invalid_point {
                    records.push(NodeInvalidResponse {
                        epoch,
                        address: outcome.address,
                        request: request.to_string(),
                        reason,
                        response: outcome.response.clone(),
                        created_at: now,
                    });
                }
            }
            valid_total += outcome.valid_point;
            invalid_total += outcome.invalid_point;
        }

        let updated: Vec<_> = stats.into_values().collect();
        self.repository.save_stats(&updated).await?;
        if !counters.is_empty() {
            self.store.incr_batch(&counters).await?;
        }
        if !records.is_empty() {
            self.repository.save_invalid_responses(&records).await?;
        }
        for stat in &updated {
            for class in stat.classes() {
                self.index.add_or_update_score(class, stat.endpoint_cache()).await?;
            }
        }
        drop(guard);
        self.metrics.record_votes(valid_total, invalid_total);

        if !demotions.is_empty() {
            match self.settlement.submit_demotions(epoch, &demotions).await {
                Ok(tx) => {
                    info!(epoch, count = demotions.len(), tx = %tx, "demotions submitted");
                    self.metrics.record_demotions(demotions.len());
                }
                Err(e) => {
                    error!(
                        epoch,
                        count = demotions.len(),
                        error = %e,
                        "demotion submission failed"
                    );
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}
