//! Reliability score.
//!
//! The score is an additive composite of independently capped terms, derived
//! only from a node's [`Stat`]. An epoch invalid count at or over the
//! demotion threshold forces the score to exactly zero.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::Stat;

/// Constants of the score terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Staking divisor before the log2 (default: 100000)
    #[serde(default = "default_staking_divisor")]
    pub staking_divisor: f64,

    #[serde(default = "default_staking_cap")]
    pub staking_cap: f64,

    /// Added for nodes that are not public-good (default: 1.0)
    #[serde(default = "default_non_public_good_bonus")]
    pub non_public_good_bonus: f64,

    /// Epoch length in hours used by the uptime term (default: 18)
    #[serde(default = "default_epoch_hours")]
    pub epoch_hours: f64,

    /// Epochs of continuous uptime per full uptime unit (default: 120)
    #[serde(default = "default_uptime_epochs")]
    pub uptime_epochs: f64,

    #[serde(default = "default_uptime_cap")]
    pub uptime_cap: f64,

    #[serde(default = "default_total_request_divisor")]
    pub total_request_divisor: f64,

    /// Log base of the lifetime request term (default: 100)
    #[serde(default = "default_total_request_base")]
    pub total_request_base: f64,

    #[serde(default = "default_total_request_cap")]
    pub total_request_cap: f64,

    #[serde(default = "default_epoch_request_divisor")]
    pub epoch_request_divisor: f64,

    /// Log base of the current-epoch request term (default: 5000)
    #[serde(default = "default_epoch_request_base")]
    pub epoch_request_base: f64,

    #[serde(default = "default_epoch_request_cap")]
    pub epoch_request_cap: f64,

    /// Per served network (default: 0.1)
    #[serde(default = "default_network_weight")]
    pub network_weight: f64,

    /// Added for RSS-serving nodes (default: 0.3)
    #[serde(default = "default_rss_bonus")]
    pub rss_bonus: f64,

    /// Per ready indexing worker (default: 0.05)
    #[serde(default = "default_indexer_weight")]
    pub indexer_weight: f64,

    #[serde(default = "default_indexer_cap")]
    pub indexer_cap: f64,

    /// Subtracted per invalid response in the current epoch (default: 0.5)
    #[serde(default = "default_invalid_penalty")]
    pub invalid_penalty: f64,
}

fn default_staking_divisor() -> f64 {
    100_000.0
}
fn default_staking_cap() -> f64 {
    0.2
}
fn default_non_public_good_bonus() -> f64 {
    1.0
}
fn default_epoch_hours() -> f64 {
    18.0
}
fn default_uptime_epochs() -> f64 {
    120.0
}
fn default_uptime_cap() -> f64 {
    0.3
}
fn default_total_request_divisor() -> f64 {
    100_000.0
}
fn default_total_request_base() -> f64 {
    100.0
}
fn default_total_request_cap() -> f64 {
    0.3
}
fn default_epoch_request_divisor() -> f64 {
    1_000_000.0
}
fn default_epoch_request_base() -> f64 {
    5_000.0
}
fn default_epoch_request_cap() -> f64 {
    1.0
}
fn default_network_weight() -> f64 {
    0.1
}
fn default_rss_bonus() -> f64 {
    0.3
}
fn default_indexer_weight() -> f64 {
    0.05
}
fn default_indexer_cap() -> f64 {
    0.2
}
fn default_invalid_penalty() -> f64 {
    0.5
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            staking_divisor: default_staking_divisor(),
            staking_cap: default_staking_cap(),
            non_public_good_bonus: default_non_public_good_bonus(),
            epoch_hours: default_epoch_hours(),
            uptime_epochs: default_uptime_epochs(),
            uptime_cap: default_uptime_cap(),
            total_request_divisor: default_total_request_divisor(),
            total_request_base: default_total_request_base(),
            total_request_cap: default_total_request_cap(),
            epoch_request_divisor: default_epoch_request_divisor(),
            epoch_request_base: default_epoch_request_base(),
            epoch_request_cap: default_epoch_request_cap(),
            network_weight: default_network_weight(),
            rss_bonus: default_rss_bonus(),
            indexer_weight: default_indexer_weight(),
            indexer_cap: default_indexer_cap(),
            invalid_penalty: default_invalid_penalty(),
        }
    }
}

/// Score with its individual terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReliabilityScore {
    pub composite: f64,
    pub staking_factor: f64,
    pub public_good_factor: f64,
    pub uptime_factor: f64,
    pub total_request_factor: f64,
    pub epoch_request_factor: f64,
    pub network_factor: f64,
    pub indexer_factor: f64,
    pub penalty: f64,
    /// The demotion threshold forced the composite to zero.
    pub forced_zero: bool,
}

pub struct ReliabilityScorer {
    config: ArcSwap<ScoringConfig>,
    demotion_threshold: u64,
}

impl ReliabilityScorer {
    #[must_use]
    pub fn new(config: ScoringConfig, demotion_threshold: u64) -> Self {
        Self { config: ArcSwap::from_pointee(config), demotion_threshold }
    }

    pub fn update_config(&self, config: ScoringConfig) {
        self.config.store(Arc::new(config));
    }

    #[must_use]
    pub fn demotion_threshold(&self) -> u64 {
        self.demotion_threshold
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn calculate(&self, stat: &Stat, now: DateTime<Utc>) -> ReliabilityScore {
        let config = self.config.load();

        let staking_factor = Self::staking_factor(stat.staking, &config);
        let public_good_factor =
            if stat.is_public_good { 0.0 } else { config.non_public_good_bonus };
        let uptime_factor = Self::uptime_factor(stat.reset_at, now, &config);
        let total_request_factor = Self::log_factor(
            stat.total_request as f64 / config.total_request_divisor,
            config.total_request_base,
            config.total_request_cap,
        );
        let epoch_request_factor = Self::log_factor(
            stat.epoch_request as f64 / config.epoch_request_divisor,
            config.epoch_request_base,
            config.epoch_request_cap,
        );
        let mut network_factor = config.network_weight
            * f64::from(stat.decentralized_network + stat.federated_network);
        if stat.is_rss_node {
            network_factor += config.rss_bonus;
        }
        let indexer_factor =
            (f64::from(stat.indexer) * config.indexer_weight).min(config.indexer_cap);

        let forced_zero = stat.epoch_invalid_request >= self.demotion_threshold;
        let penalty = config.invalid_penalty * stat.epoch_invalid_request as f64;
        let composite = if forced_zero {
            0.0
        } else {
            staking_factor
                + public_good_factor
                + uptime_factor
                + total_request_factor
                + epoch_request_factor
                + network_factor
                + indexer_factor
                - penalty
        };

        ReliabilityScore {
            composite,
            staking_factor,
            public_good_factor,
            uptime_factor,
            total_request_factor,
            epoch_request_factor,
            network_factor,
            indexer_factor,
            penalty,
            forced_zero,
        }
    }

    /// Composite score of `stat` at `now`.
    #[must_use]
    pub fn score(&self, stat: &Stat, now: DateTime<Utc>) -> f64 {
        self.calculate(stat, now).composite
    }

    /// `min(log2(staking / divisor + 1), cap)`.
    fn staking_factor(staking: f64, config: &ScoringConfig) -> f64 {
        (staking.max(0.0) / config.staking_divisor + 1.0).log2().min(config.staking_cap)
    }

    /// `min(ceil(hours / epoch_hours) / uptime_epochs, cap)`.
    #[allow(clippy::cast_precision_loss)]
    fn uptime_factor(reset_at: DateTime<Utc>, now: DateTime<Utc>, config: &ScoringConfig) -> f64 {
        let hours = ((now - reset_at).num_seconds().max(0) as f64) / 3_600.0;
        ((hours / config.epoch_hours).ceil() / config.uptime_epochs).min(config.uptime_cap)
    }

    /// `min(log_base(x + 1), cap)`.
    fn log_factor(x: f64, base: f64, cap: f64) -> f64 {
        ((x.max(0.0) + 1.0).ln() / base.ln()).min(cap)
    }
}
