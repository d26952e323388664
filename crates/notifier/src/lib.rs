pub mod api;
pub mod config;
pub mod domain;
pub mod infra;
pub mod startup;

pub use api::routes::*;
pub use config::*;
pub use domain::{
    BalanceSnapshot, Error as NotifierError, SnapshotStore, WatchRegistry, WatchedIdentifier,
};
pub use infra::db::*;
pub use infra::explorer::{BalanceSource, Error as ExplorerError, ExplorerClient};
pub use infra::file_utils::*;
pub use infra::webhook::{DiscordWebhook, Error as WebhookError, Notify};
pub use startup::*;
