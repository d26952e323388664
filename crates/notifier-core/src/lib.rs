//! notifier-core: Shared types for the balance notifier
//!
//! This crate holds the pure pieces of the watch engine: how identifiers are
//! classified, which display currencies exist and how a satoshi balance is
//! converted with a price quote. Nothing in here performs I/O.

pub mod errors;
pub mod types;
pub mod validation;

pub use errors::*;
pub use types::*;
pub use validation::*;
