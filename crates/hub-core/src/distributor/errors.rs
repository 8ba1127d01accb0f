use thiserror::Error;

use crate::{index::IndexError, repository::RepositoryError, router::RouterError};

#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum DistributorError {
    #[error("no qualified nodes available")]
    NoQualifiedNodes,

    #[error("no results")]
    NoResults,

    /// The fan-out deadline passed; the caller may retry.
    #[error("request timed out")]
    Timeout,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Router(RouterError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl DistributorError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<RouterError> for DistributorError {
    fn from(error: RouterError) -> Self {
        match error {
            RouterError::NoNodes => Self::NoQualifiedNodes,
            RouterError::Timeout => Self::Timeout,
            e if e.is_no_result() => Self::NoResults,
            e => Self::Router(e),
        }
    }
}
