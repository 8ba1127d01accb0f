use thiserror::Error;

use crate::{
    index::IndexError, repository::RepositoryError, settlement::SettlementError, store::StoreError,
};

#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum EnforcerError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error("invalid enforcer configuration: {0}")]
    Config(String),
}
