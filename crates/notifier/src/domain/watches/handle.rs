use notifier_core::Identifier;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Active watchers keyed by identifier string
pub type WatchTable = Arc<Mutex<HashMap<String, WatcherHandle>>>;

/// Control side of one watcher loop. Cloning shares the same token, flag and
/// write gate.
#[derive(Clone, Debug)]
pub struct WatcherHandle {
    pub identifier: Identifier,
    pub nickname: String,
    /// Distinguishes handles for the same identifier across re-watches
    pub generation: u64,
    pub cancel_token: CancellationToken,
    running: Arc<AtomicBool>,
    /// Held by the loop around every write and notification, and by unwatch
    /// while it removes the snapshot
    pub write_gate: Arc<Mutex<()>>,
}

impl WatcherHandle {
    pub fn new(
        identifier: Identifier,
        nickname: String,
        generation: u64,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            identifier,
            nickname,
            generation,
            cancel_token,
            running: Arc::new(AtomicBool::new(true)),
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_stopped(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Safe to call any number of times
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}
