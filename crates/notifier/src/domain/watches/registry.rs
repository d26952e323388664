use log::{debug, error, info, warn};
use notifier_core::{Identifier, IdentifierKind, SeedWatch};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::Mutex;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{BalanceWatcher, RegistryError, WatchContext, WatchTable, WatcherHandle};
use crate::domain::{self, BalanceSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedIdentifier {
    pub identifier: String,
    pub kind: IdentifierKind,
    pub nickname: String,
}

/// Owns the identifier to watcher mapping and starts or stops one
/// [`BalanceWatcher`] task per entry
pub struct WatchRegistry {
    context: Arc<WatchContext>,
    table: WatchTable,
    root_token: CancellationToken,
    tracker: TaskTracker,
    next_generation: AtomicU64,
}

impl WatchRegistry {
    pub fn new(context: WatchContext, root_token: CancellationToken, tracker: TaskTracker) -> Self {
        Self {
            context: Arc::new(context),
            table: Arc::new(Mutex::new(HashMap::new())),
            root_token,
            tracker,
            next_generation: AtomicU64::new(1),
        }
    }

    pub async fn watch(
        &self,
        raw: &str,
        nickname: &str,
    ) -> Result<WatchedIdentifier, RegistryError> {
        let identifier = Identifier::parse(raw)?;
        let nickname = nickname.trim();

        // The table stays locked across the snapshot lookup and insert, so the
        // check, the initial row and the registration form one critical
        // section. Unwatch, listing and deregistration wait for it.
        let mut table = self.table.lock().await;
        if table.contains_key(identifier.as_str()) {
            return Err(RegistryError::AlreadyWatched(identifier.to_string()));
        }

        // an existing row keeps its own nickname
        let nickname = match self.context.store.get_snapshot(identifier.as_str()).await? {
            Some(existing) => existing.nickname,
            None => {
                let snapshot =
                    BalanceSnapshot::zero(&identifier, nickname, self.context.default_currency);
                match self.context.store.create_snapshot(&snapshot).await {
                    Ok(1) => debug!("created initial snapshot for {}", identifier),
                    Ok(rows) => {
                        return Err(RegistryError::CreationFailed(format!(
                            "{} rows affected creating snapshot for {}",
                            rows, identifier
                        )))
                    }
                    Err(e) => return Err(RegistryError::CreationFailed(e.to_string())),
                }
                snapshot.nickname
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let handle = WatcherHandle::new(
            identifier.clone(),
            nickname.clone(),
            generation,
            self.root_token.child_token(),
        );
        table.insert(identifier.as_str().to_string(), handle.clone());

        let watcher = BalanceWatcher::new(self.context.clone(), handle, self.table.clone());
        self.tracker.spawn(watcher.watch());
        info!(
            "watching {} {} as \"{}\"",
            identifier.kind(),
            identifier,
            nickname
        );

        Ok(WatchedIdentifier {
            identifier: identifier.as_str().to_string(),
            kind: identifier.kind(),
            nickname,
        })
    }

    /// Stops the watcher and deletes its snapshot. Returns whether anything
    /// was removed, unknown identifiers are not an error.
    pub async fn unwatch(&self, raw: &str) -> Result<bool, domain::Error> {
        let key = raw.trim();
        let handle = self.table.lock().await.remove(key);

        let deleted = match &handle {
            Some(handle) => {
                handle.cancel();
                // the loop checks cancellation under this gate, once it is held
                // no further write or notification can happen
                let _gate = handle.write_gate.lock().await;
                self.context.store.delete_snapshot(key).await?
            }
            None => self.context.store.delete_snapshot(key).await?,
        };

        if handle.is_some() || deleted {
            info!("stopped watching {}", key);
        } else {
            debug!("unwatch of {} had nothing to remove", key);
        }
        Ok(handle.is_some() || deleted)
    }

    pub async fn list_watched(&self) -> Vec<WatchedIdentifier> {
        let handles: Vec<WatcherHandle> = self.table.lock().await.values().cloned().collect();

        let mut watched = Vec::with_capacity(handles.len());
        for handle in handles {
            let nickname = match self.context.store.get_nickname(handle.identifier.as_str()).await {
                Ok(Some(nickname)) => nickname,
                Ok(None) => handle.nickname.clone(),
                Err(e) => {
                    warn!(
                        "failed to look up nickname for {}: {}",
                        handle.identifier, e
                    );
                    handle.nickname.clone()
                }
            };
            watched.push(WatchedIdentifier {
                identifier: handle.identifier.as_str().to_string(),
                kind: handle.identifier.kind(),
                nickname,
            });
        }
        watched
    }

    pub async fn is_watched(&self, raw: &str) -> bool {
        self.table.lock().await.contains_key(raw.trim())
    }

    /// Re-watches every persisted snapshot, returns how many watchers started
    pub async fn restore(&self) -> Result<usize, domain::Error> {
        let snapshots = self.context.store.list_snapshots().await?;
        let mut started = 0;
        for snapshot in snapshots {
            match self.watch(&snapshot.identifier, &snapshot.nickname).await {
                Ok(_) => started += 1,
                Err(RegistryError::AlreadyWatched(identifier)) => {
                    debug!("{} is already watched, skipping restore", identifier)
                }
                Err(e) => error!("failed to restore watch for {}: {}", snapshot.identifier, e),
            }
        }
        info!("restored {} watches", started);
        Ok(started)
    }

    /// Watches configured entries that aren't watched yet
    pub async fn seed(&self, seeds: &[SeedWatch]) -> usize {
        let mut started = 0;
        for seed in seeds {
            match self.watch(seed.identifier.as_str(), &seed.nickname).await {
                Ok(_) => started += 1,
                Err(RegistryError::AlreadyWatched(identifier)) => {
                    debug!("seed {} is already watched", identifier)
                }
                Err(e) => error!("failed to seed watch for {}: {}", seed.identifier, e),
            }
        }
        started
    }

    /// Cancels every watcher; the tracker can be awaited afterwards
    pub fn shutdown(&self) {
        self.root_token.cancel();
        self.tracker.close();
    }

    pub async fn wait_for_watchers(&self) {
        self.tracker.wait().await;
    }
}
