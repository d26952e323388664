//! Shared error types

use thiserror::Error;

/// Core errors shared by the service crates
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("unknown currency code: {0}")]
    UnknownCurrency(String),
}
