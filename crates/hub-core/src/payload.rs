//! Response shapes nodes return and the validity classification applied to
//! every fan-out leg.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A single indexed activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub network: String,
    #[serde(default)]
    pub index: u64,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub actions: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Pagination metadata of a list response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityResponse {
    pub data: Option<Activity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitiesResponse {
    pub data: Option<Vec<Activity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Error payload emitted by nodes and by this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("node reported {code}: {message}")]
    ErrorCode { code: String, message: String },

    #[error("unrecognized payload: {0}")]
    Unrecognized(String),
}

/// Result of classifying a successfully fetched payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Known shape carrying non-null, non-empty data.
    Valid,
    /// Known shape whose data is null or an empty list.
    Empty,
}

/// What a route expects nodes to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadKind {
    #[default]
    Activity,
    /// Opaque body such as an RSS feed; any non-blank body is valid.
    Raw,
}

/// Classifies a payload according to the route's [`PayloadKind`].
///
/// # Errors
///
/// See [`classify`]; raw payloads never fail.
pub fn classify_as(kind: PayloadKind, bytes: &[u8]) -> Result<Classification, PayloadError> {
    match kind {
        PayloadKind::Activity => classify(bytes),
        PayloadKind::Raw if bytes.trim_ascii().is_empty() => Ok(Classification::Empty),
        PayloadKind::Raw => Ok(Classification::Valid),
    }
}

/// Classifies a payload as one of the known activity response shapes.
///
/// # Errors
///
/// An error-coded payload yields [`PayloadError::ErrorCode`] even though it
/// parses; anything that is not a known shape yields
/// [`PayloadError::Unrecognized`].
pub fn classify(bytes: &[u8]) -> Result<Classification, PayloadError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| PayloadError::Unrecognized(format!("not JSON: {e}")))?;
    let Value::Object(object) = value else {
        return Err(PayloadError::Unrecognized("top level is not an object".to_string()));
    };

    if object.contains_key("error_code") || object.contains_key("error") {
        let error: ErrorResponse = serde_json::from_value(Value::Object(object))
            .map_err(|e| PayloadError::Unrecognized(format!("malformed error payload: {e}")))?;
        return Err(PayloadError::ErrorCode { code: error.error_code, message: error.error });
    }

    match object.get("data") {
        None => Err(PayloadError::Unrecognized("missing data field".to_string())),
        Some(Value::Null) => Ok(Classification::Empty),
        Some(Value::Array(items)) if items.is_empty() => Ok(Classification::Empty),
        Some(Value::Array(_)) => {
            serde_json::from_value::<ActivitiesResponse>(Value::Object(object))
                .map_err(|e| PayloadError::Unrecognized(format!("malformed activity list: {e}")))?;
            Ok(Classification::Valid)
        }
        Some(Value::Object(_)) => {
            serde_json::from_value::<ActivityResponse>(Value::Object(object))
                .map_err(|e| PayloadError::Unrecognized(format!("malformed activity: {e}")))?;
            Ok(Classification::Valid)
        }
        Some(_) => Err(PayloadError::Unrecognized("data is not an activity".to_string())),
    }
}
