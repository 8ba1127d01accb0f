//! Semantic identity of two node payloads.
//!
//! Activities are compared on their core fields and on their actions as an
//! unordered set. Actions of platforms whose content can be edited after
//! indexing are left out. Lists compare as multisets, so two nodes returning
//! the same activities in a different order agree. Payloads that are not a
//! known shape fall back to canonical JSON and then to raw bytes.

use ahash::AHashSet;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::hash::{Hash, Hasher};

use crate::{
    payload::{ActivitiesResponse, Activity, ActivityResponse},
    types::DataResponse,
    utils::{fingerprint, fingerprint_bytes, json_hash::stable_hasher, unordered_fingerprint},
};

/// Expected shape of the payloads being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Single,
    Multi,
}

#[derive(Debug, Clone, Default)]
pub struct IdentityChecker {
    mutable_platforms: AHashSet<String>,
}

impl IdentityChecker {
    #[must_use]
    pub fn new(mutable_platforms: &[String]) -> Self {
        Self { mutable_platforms: mutable_platforms.iter().map(|p| p.to_lowercase()).collect() }
    }

    fn is_mutable(&self, activity: &Activity) -> bool {
        activity
            .platform
            .as_deref()
            .is_some_and(|platform| self.mutable_platforms.contains(&platform.to_lowercase()))
    }

    /// Fingerprint of the fields that must match for two activities to agree.
    #[must_use]
    pub fn activity_fingerprint(&self, activity: &Activity) -> u64 {
        let mut hasher = stable_hasher();
        activity.id.hash(&mut hasher);
        activity.network.hash(&mut hasher);
        activity.index.hash(&mut hasher);
        activity.from.to_lowercase().hash(&mut hasher);
        activity.to.to_lowercase().hash(&mut hasher);
        activity.tag.hash(&mut hasher);
        activity.kind.hash(&mut hasher);
        activity.actions.len().hash(&mut hasher);
        if !self.is_mutable(activity) {
            unordered_fingerprint(activity.actions.iter().map(fingerprint)).hash(&mut hasher);
        }
        hasher.finish()
    }

    #[must_use]
    pub fn activities_identical(&self, a: &Activity, b: &Activity) -> bool {
        self.activity_fingerprint(a) == self.activity_fingerprint(b)
    }

    /// Identity of two raw payloads under `shape`.
    #[must_use]
    pub fn payloads_identical(&self, a: &[u8], b: &[u8], shape: ResponseShape) -> bool {
        let structured = match shape {
            ResponseShape::Single => self.single_identical(a, b),
            ResponseShape::Multi => self.multi_identical(a, b),
        };
        if let Some(identical) = structured {
            return identical;
        }

        match (fingerprint_bytes(a), fingerprint_bytes(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        }
    }

    /// Identity of two fan-out responses. Responses without a payload only
    /// match each other.
    #[must_use]
    pub fn responses_identical(
        &self,
        a: &DataResponse,
        b: &DataResponse,
        shape: ResponseShape,
    ) -> bool {
        match (&a.data, &b.data) {
            (Some(x), Some(y)) => self.payloads_identical(x, y, shape),
            (None, None) => true,
            _ => false,
        }
    }

    fn single_identical(&self, a: &[u8], b: &[u8]) -> Option<bool> {
        let a: ActivityResponse = parse_envelope(a)?;
        let b: ActivityResponse = parse_envelope(b)?;
        Some(match (a.data, b.data) {
            (Some(x), Some(y)) => self.activities_identical(&x, &y),
            (None, None) => true,
            _ => false,
        })
    }

    fn multi_identical(&self, a: &[u8], b: &[u8]) -> Option<bool> {
        let a: ActivitiesResponse = parse_envelope(a)?;
        let b: ActivitiesResponse = parse_envelope(b)?;
        let a = a.data.unwrap_or_default();
        let b = b.data.unwrap_or_default();
        if a.len() != b.len() {
            return Some(false);
        }
        let fingerprint_all = |items: &[Activity]| {
            unordered_fingerprint(items.iter().map(|activity| self.activity_fingerprint(activity)))
        };
        Some(fingerprint_all(&a) == fingerprint_all(&b))
    }
}

/// Parses a `{"data": ...}` envelope; a missing `data` key is not a match.
fn parse_envelope<T: DeserializeOwned>(bytes: &[u8]) -> Option<T> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    if !value.as_object().is_some_and(|object| object.contains_key("data")) {
        return None;
    }
    serde_json::from_value(value).ok()
}
