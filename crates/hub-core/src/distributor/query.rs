//! Query shapes accepted by the distributor routes.
//!
//! Filters arrive as raw `key=value` pairs so repeated keys (`network=a&network=b`)
//! survive; they are validated once here and re-encoded for every node.

use serde::{Deserialize, Serialize};

use super::DistributorError;

pub const MAX_LIMIT: u32 = 100;
pub const MAX_ACTION_LIMIT: u32 = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityQuery {
    pub id: String,
    #[serde(default)]
    pub action_limit: Option<u32>,
    #[serde(default)]
    pub action_page: Option<u32>,
}

impl ActivityQuery {
    /// # Errors
    ///
    /// Returns [`DistributorError::InvalidQuery`] for an empty id or an
    /// out-of-range parameter.
    pub fn from_pairs(id: &str, pairs: &[(String, String)]) -> Result<Self, DistributorError> {
        let mut query = Self { id: non_empty("id", id)?, ..Self::default() };
        for (key, value) in pairs {
            match key.as_str() {
                "action_limit" => query.action_limit = Some(bounded(key, value, MAX_ACTION_LIMIT)?),
                "action_page" => query.action_page = Some(number(key, value)?),
                _ => {}
            }
        }
        Ok(query)
    }

    #[must_use]
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        push_opt(&mut params, "action_limit", self.action_limit);
        push_opt(&mut params, "action_page", self.action_page);
        params
    }
}

/// Filters shared by every activity-list route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFilter {
    pub limit: Option<u32>,
    pub action_limit: Option<u32>,
    pub cursor: Option<String>,
    pub since_timestamp: Option<u64>,
    pub until_timestamp: Option<u64>,
    pub success: Option<bool>,
    pub direction: Option<String>,
    pub networks: Vec<String>,
    pub tags: Vec<String>,
    pub types: Vec<String>,
    pub platforms: Vec<String>,
}

impl ActivityFilter {
    /// Parses raw query pairs; unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DistributorError::InvalidQuery`] for malformed or
    /// out-of-range values.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, DistributorError> {
        let mut filter = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "limit" => filter.limit = Some(bounded(key, value, MAX_LIMIT)?),
                "action_limit" => {
                    filter.action_limit = Some(bounded(key, value, MAX_ACTION_LIMIT)?);
                }
                "cursor" => filter.cursor = Some(non_empty(key, value)?),
                "since_timestamp" => filter.since_timestamp = Some(number(key, value)?),
                "until_timestamp" => filter.until_timestamp = Some(number(key, value)?),
                "success" => {
                    filter.success = Some(value.parse().map_err(|_| {
                        DistributorError::InvalidQuery(format!("{key} must be true or false"))
                    })?);
                }
                "direction" => match value.as_str() {
                    "in" | "out" => filter.direction = Some(value.clone()),
                    _ => {
                        return Err(DistributorError::InvalidQuery(format!(
                            "{key} must be in or out"
                        )));
                    }
                },
                "network" => filter.networks.push(non_empty(key, value)?),
                "tag" => filter.tags.push(non_empty(key, value)?),
                "type" => filter.types.push(non_empty(key, value)?),
                "platform" => filter.platforms.push(non_empty(key, value)?),
                _ => {}
            }
        }

        if let (Some(since), Some(until)) = (filter.since_timestamp, filter.until_timestamp) {
            if since > until {
                return Err(DistributorError::InvalidQuery(
                    "since_timestamp is after until_timestamp".to_string(),
                ));
            }
        }
        Ok(filter)
    }

    #[must_use]
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        push_opt(&mut params, "limit", self.limit);
        push_opt(&mut params, "action_limit", self.action_limit);
        push_opt(&mut params, "cursor", self.cursor.as_ref());
        push_opt(&mut params, "since_timestamp", self.since_timestamp);
        push_opt(&mut params, "until_timestamp", self.until_timestamp);
        push_opt(&mut params, "success", self.success);
        push_opt(&mut params, "direction", self.direction.as_ref());
        for (key, values) in [
            ("network", &self.networks),
            ("tag", &self.tags),
            ("type", &self.types),
            ("platform", &self.platforms),
        ] {
            params.extend(values.iter().map(|v| (key.to_string(), v.clone())));
        }
        params
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountQuery {
    pub account: String,
    #[serde(default)]
    pub filter: ActivityFilter,
}

impl AccountQuery {
    /// # Errors
    ///
    /// See [`ActivityFilter::from_pairs`].
    pub fn from_pairs(account: &str, pairs: &[(String, String)]) -> Result<Self, DistributorError> {
        Ok(Self {
            account: non_empty("account", account)?,
            filter: ActivityFilter::from_pairs(pairs)?,
        })
    }

    #[must_use]
    pub fn query_params(&self) -> Vec<(String, String)> {
        self.filter.query_params()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkActivitiesQuery {
    pub network: String,
    #[serde(default)]
    pub filter: ActivityFilter,
}

impl NetworkActivitiesQuery {
    /// # Errors
    ///
    /// See [`ActivityFilter::from_pairs`].
    pub fn from_pairs(network: &str, pairs: &[(String, String)]) -> Result<Self, DistributorError> {
        Ok(Self {
            network: non_empty("network", network)?,
            filter: ActivityFilter::from_pairs(pairs)?,
        })
    }

    #[must_use]
    pub fn query_params(&self) -> Vec<(String, String)> {
        self.filter.query_params()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformActivitiesQuery {
    pub platform: String,
    #[serde(default)]
    pub filter: ActivityFilter,
}

impl PlatformActivitiesQuery {
    /// # Errors
    ///
    /// See [`ActivityFilter::from_pairs`].
    pub fn from_pairs(
        platform: &str,
        pairs: &[(String, String)],
    ) -> Result<Self, DistributorError> {
        Ok(Self {
            platform: non_empty("platform", platform)?,
            filter: ActivityFilter::from_pairs(pairs)?,
        })
    }

    #[must_use]
    pub fn query_params(&self) -> Vec<(String, String)> {
        self.filter.query_params()
    }
}

fn push_opt<T: ToString>(params: &mut Vec<(String, String)>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        params.push((key.to_string(), value.to_string()));
    }
}

fn non_empty(key: &str, value: &str) -> Result<String, DistributorError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DistributorError::InvalidQuery(format!("{key} must not be empty")));
    }
    Ok(value.to_string())
}

fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, DistributorError> {
    value.trim().parse().map_err(|_| {
        DistributorError::InvalidQuery(format!("{key} must be a non-negative integer"))
    })
}

fn bounded(key: &str, value: &str, max: u32) -> Result<u32, DistributorError> {
    let parsed: u32 = number(key, value)?;
    if parsed == 0 || parsed > max {
        return Err(DistributorError::InvalidQuery(format!("{key} must be between 1 and {max}")));
    }
    Ok(parsed)
}
