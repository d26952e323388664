//! The watch engine: one polling loop per watched identifier, the extended
//! key scanner those loops use, and the registry that starts and stops them.

mod converter;
mod handle;
mod notification;
mod registry;
mod scanner;
#[cfg(test)]
mod testing;
mod watcher;

pub use converter::*;
pub use handle::*;
pub use notification::*;
pub use registry::*;
pub use scanner::*;
pub use watcher::*;

use notifier_core::{CoreError, Currency};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

use crate::{
    domain::{self, SnapshotStore},
    infra::{explorer::BalanceSource, webhook::Notify},
};

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("price quote unavailable: {0}")]
    QuoteUnavailable(#[from] crate::infra::explorer::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScanError {
    #[error("scan cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{0} is already being watched")]
    AlreadyWatched(String),
    #[error("unable to create initial snapshot: {0}")]
    CreationFailed(String),
    #[error(transparent)]
    InvalidIdentifier(#[from] CoreError),
    #[error(transparent)]
    Store(#[from] domain::Error),
}

/// Why a single poll cycle did not complete
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("watch cancelled")]
    Cancelled,
    /// The initial snapshot could not be stored, the watcher stops
    #[error("unable to create initial snapshot: {0}")]
    Setup(domain::Error),
    #[error("unable to load snapshot: {0}")]
    Store(domain::Error),
}

/// Dependencies shared by every watcher loop
pub struct WatchContext {
    pub store: SnapshotStore,
    pub source: Arc<dyn BalanceSource>,
    pub notifier: Arc<dyn Notify>,
    pub converter: CurrencyConverter,
    pub scanner: PubkeyScanner,
    pub default_currency: Currency,
    pub sleep_interval: Duration,
}

impl WatchContext {
    pub fn new(
        store: SnapshotStore,
        source: Arc<dyn BalanceSource>,
        notifier: Arc<dyn Notify>,
        scan_settings: ScanSettings,
        default_currency: Currency,
        sleep_interval: Duration,
    ) -> Self {
        Self {
            converter: CurrencyConverter::new(source.clone()),
            scanner: PubkeyScanner::new(source.clone(), scan_settings),
            store,
            source,
            notifier,
            default_currency,
            sleep_interval,
        }
    }
}
