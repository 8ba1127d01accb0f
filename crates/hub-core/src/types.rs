//! Node model shared by every component: identities, lifecycle status,
//! per-node statistics, the index projection and fan-out responses.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

use crate::{
    fetch::FetchError,
    utils::{format_address, hex_buffer::with_address, parse_hex_array},
};

/// Epoch number as announced by the settlement layer.
pub type Epoch = u64;

/// 20-byte node identity, rendered as lowercase `0x` hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid node address: {0}")]
pub struct AddressParseError(pub String);

impl Address {
    #[must_use]
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_array::<20>(s.trim()).map(Self).ok_or_else(|| AddressParseError(s.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        with_address(&self.0, |hex| f.write_str(hex))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_address(&self.0))
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Lifecycle status of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Registered,
    Online,
    Offline,
    Exiting,
    Exited,
    Slashing,
    Slashed,
    Initializing,
    Outdated,
}

impl NodeStatus {
    /// Nodes in these states are never probed during epoch maintenance.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited | Self::Slashing | Self::Slashed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Exiting => "exiting",
            Self::Exited => "exited",
            Self::Slashing => "slashing",
            Self::Slashed => "slashed",
            Self::Initializing => "initializing",
            Self::Outdated => "outdated",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered node as persisted by the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub address: Address,
    pub endpoint: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub status: NodeStatus,
    /// Staked amount in whole tokens.
    #[serde(default)]
    pub staking: f64,
    #[serde(default)]
    pub is_public_good: bool,
    /// Operator tax rate in basis points.
    #[serde(default)]
    pub tax_rate_basis_points: u64,
}

/// Per-node reliability statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub address: Address,
    pub endpoint: String,
    #[serde(default)]
    pub access_token: String,
    pub score: f64,
    pub is_public_good: bool,
    pub is_full_node: bool,
    pub is_rss_node: bool,
    pub staking: f64,
    pub epoch: Epoch,
    pub total_request: u64,
    pub epoch_request: u64,
    pub total_invalid_request: u64,
    pub epoch_invalid_request: u64,
    pub decentralized_network: u32,
    pub federated_network: u32,
    pub indexer: u32,
    /// Last time the node (re)entered `Online`; drives the uptime factor.
    pub reset_at: DateTime<Utc>,
}

impl Stat {
    /// Fresh statistics for a node that has never been scored.
    #[must_use]
    pub fn new(node: &Node, epoch: Epoch, now: DateTime<Utc>) -> Self {
        Self {
            address: node.address,
            endpoint: node.endpoint.clone(),
            access_token: node.access_token.clone(),
            score: 0.0,
            is_public_good: node.is_public_good,
            is_full_node: false,
            is_rss_node: false,
            staking: node.staking,
            epoch,
            total_request: 0,
            epoch_request: 0,
            total_invalid_request: 0,
            epoch_invalid_request: 0,
            decentralized_network: 0,
            federated_network: 0,
            indexer: 0,
            reset_at: now,
        }
    }

    /// Adds vote points to both the lifetime and the per-epoch counters.
    pub fn apply_points(&mut self, valid: u64, invalid: u64) {
        self.total_request += valid;
        self.epoch_request += valid;
        self.total_invalid_request += invalid;
        self.epoch_invalid_request += invalid;
    }

    /// Moves the stat into `epoch`, zeroing the per-epoch counters.
    pub fn reset_epoch(&mut self, epoch: Epoch) {
        self.epoch = epoch;
        self.epoch_request = 0;
        self.epoch_invalid_request = 0;
    }

    #[must_use]
    pub fn endpoint_cache(&self) -> NodeEndpointCache {
        NodeEndpointCache {
            address: self.address,
            endpoint: self.endpoint.clone(),
            access_token: self.access_token.clone(),
            score: self.score,
            invalid_count: self.epoch_invalid_request,
        }
    }

    /// Index classes this node belongs to.
    #[must_use]
    pub fn classes(&self) -> Vec<NodeClass> {
        let mut classes = Vec::with_capacity(2);
        if self.is_full_node {
            classes.push(NodeClass::Full);
        }
        if self.is_rss_node {
            classes.push(NodeClass::Rss);
        }
        classes
    }
}

/// Projection of a node kept in the qualified-node index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEndpointCache {
    pub address: Address,
    pub endpoint: String,
    #[serde(default)]
    pub access_token: String,
    pub score: f64,
    /// Invalid responses recorded in the current epoch.
    #[serde(default)]
    pub invalid_count: u64,
}

/// Index class a node can qualify for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    Full,
    Rss,
}

impl NodeClass {
    pub const ALL: [Self; 2] = [Self::Full, Self::Rss];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Rss => "rss",
        }
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one node's leg of a fan-out.
///
/// Voting only ever touches `valid_point` and `invalid_point`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataResponse {
    pub address: Address,
    pub endpoint: String,
    pub data: Option<Bytes>,
    /// Payload parsed into a known shape with non-empty data.
    pub valid: bool,
    pub err: Option<FetchError>,
    pub valid_point: u32,
    pub invalid_point: u32,
}

impl DataResponse {
    #[must_use]
    pub fn success(
        address: Address,
        endpoint: impl Into<String>,
        data: Bytes,
        valid: bool,
    ) -> Self {
        Self {
            address,
            endpoint: endpoint.into(),
            data: Some(data),
            valid,
            err: None,
            valid_point: 0,
            invalid_point: 0,
        }
    }

    #[must_use]
    pub fn failure(
        address: Address,
        endpoint: impl Into<String>,
        data: Option<Bytes>,
        err: FetchError,
    ) -> Self {
        Self {
            address,
            endpoint: endpoint.into(),
            data,
            valid: false,
            err: Some(err),
            valid_point: 0,
            invalid_point: 0,
        }
    }

    #[must_use]
    pub fn is_err(&self) -> bool {
        self.err.is_some()
    }

    /// Valid and error-free: eligible to win a fan-out outright.
    #[must_use]
    pub fn is_winner(&self) -> bool {
        self.valid && self.err.is_none()
    }
}

/// Historical record of a worker a node ran in a given epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeWorker {
    pub epoch: Epoch,
    pub address: Address,
    pub network: String,
    pub worker: String,
    pub is_active: bool,
}

/// Why a node was charged an invalid point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// The node returned an error or an unparsable payload.
    Error,
    /// The node's payload lost the vote.
    Disagreement,
    /// A secondary node contradicted an activity the node returned.
    PartialMismatch,
}

/// Audit record of an invalid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInvalidResponse {
    pub epoch: Epoch,
    pub address: Address,
    pub request: String,
    pub reason: InvalidReason,
    /// The node's payload, when it returned one.
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Node {
        Node {
            address: Address::new([7; 20]),
            endpoint: "http://node-7".to_string(),
            access_token: "t".to_string(),
            version: "1.2.0".to_string(),
            status: NodeStatus::Online,
            staking: 5_000.0,
            is_public_good: false,
            tax_rate_basis_points: 0,
        }
    }

    #[test]
    fn address_display_and_parse_agree() {
        let address: Address = "0x0707070707070707070707070707070707070707".parse().unwrap();
        assert_eq!(address, Address::new([7; 20]));
        assert_eq!(address.to_string(), "0x0707070707070707070707070707070707070707");
        assert!("0x1234".parse::<Address>().is_err());
    }

    #[test]
    fn address_serializes_as_string() {
        let json = serde_json::to_string(&Address::new([0xab; 20])).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(20)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Address::new([0xab; 20]));
    }

    #[test]
    fn terminal_statuses() {
        assert!(NodeStatus::Exited.is_terminal());
        assert!(NodeStatus::Slashing.is_terminal());
        assert!(NodeStatus::Slashed.is_terminal());
        assert!(!NodeStatus::Exiting.is_terminal());
        assert!(!NodeStatus::Offline.is_terminal());
    }

    #[test]
    fn points_accumulate_and_epoch_reset_keeps_totals() {
        let mut stat = Stat::new(&node(), 1, Utc::now());
        stat.apply_points(2, 0);
        stat.apply_points(0, 1);
        assert_eq!((stat.total_request, stat.epoch_request), (2, 2));
        assert_eq!((stat.total_invalid_request, stat.epoch_invalid_request), (1, 1));

        stat.reset_epoch(2);
        assert_eq!(stat.epoch, 2);
        assert_eq!((stat.total_request, stat.epoch_request), (2, 0));
        assert_eq!((stat.total_invalid_request, stat.epoch_invalid_request), (1, 0));
    }

    #[test]
    fn classes_follow_flags() {
        let mut stat = Stat::new(&node(), 1, Utc::now());
        assert!(stat.classes().is_empty());
        stat.is_full_node = true;
        stat.is_rss_node = true;
        assert_eq!(stat.classes(), vec![NodeClass::Full, NodeClass::Rss]);
    }

    #[test]
    fn status_uses_snake_case_on_the_wire() {
        assert_eq!(serde_json::to_string(&NodeStatus::Initializing).unwrap(), "\"initializing\"");
    }
}
