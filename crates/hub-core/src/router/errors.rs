use thiserror::Error;

use crate::{fetch::FetchError, types::Address};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RouterError {
    #[error("no nodes to route to")]
    NoNodes,

    /// The fan-out deadline passed before any response was published. The
    /// caller may retry.
    #[error("fan-out deadline exceeded")]
    Timeout,

    #[error("node {address} failed: {source}")]
    Node {
        address: Address,
        #[source]
        source: FetchError,
    },

    #[error("invalid node endpoint {0}")]
    InvalidEndpoint(String),

    #[error("every fan-out task was lost before reporting")]
    NoResponses,
}

impl RouterError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// The winning node answered "no results".
    #[must_use]
    pub fn is_no_result(&self) -> bool {
        matches!(self, Self::Node { source, .. } if source.is_no_result())
    }
}
