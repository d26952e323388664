pub mod snapshots;
pub mod watches;

use notifier_core::CoreError;
use thiserror::Error;

use crate::infra::db::DatabaseWriteError;

pub use snapshots::*;
pub use watches::*;

#[derive(Error, Debug)]
pub enum Error {
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} is already being watched")]
    AlreadyWatched(String),
    #[error("failed to start watching: {0}")]
    CreationFailed(String),
    #[error("problem querying db: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("problem writing to db: {0}")]
    DbWriteError(#[from] DatabaseWriteError),
}

impl From<CoreError> for Error {
    fn from(value: CoreError) -> Self {
        Error::BadRequest(value.to_string())
    }
}

impl From<RegistryError> for Error {
    fn from(value: RegistryError) -> Self {
        match value {
            RegistryError::AlreadyWatched(identifier) => Error::AlreadyWatched(identifier),
            RegistryError::CreationFailed(reason) => Error::CreationFailed(reason),
            RegistryError::InvalidIdentifier(e) => e.into(),
            RegistryError::Store(e) => e,
        }
    }
}
