use log::{debug, error, info, warn};
use notifier_core::{Identifier, ZERO_AMOUNT};
use std::sync::Arc;
use tokio::time::sleep;

use super::{render_message, CycleError, ScanError, WatchContext, WatchTable, WatcherHandle};
use crate::domain::BalanceSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Balance matched the stored snapshot, nothing was written
    Unchanged,
    /// Balance changed, the snapshot was replaced and a notification sent
    Updated(BalanceSnapshot),
}

/// Polling loop for one identifier. Runs until its handle is cancelled or
/// the initial snapshot can't be stored.
pub struct BalanceWatcher {
    context: Arc<WatchContext>,
    handle: WatcherHandle,
    table: WatchTable,
}

impl BalanceWatcher {
    pub fn new(context: Arc<WatchContext>, handle: WatcherHandle, table: WatchTable) -> Self {
        Self {
            context,
            handle,
            table,
        }
    }

    pub async fn watch(self) {
        let identifier = self.handle.identifier.clone();
        info!("Starting watcher for {}", identifier);

        loop {
            if self.handle.cancel_token.is_cancelled() {
                info!("Watcher for {} received cancellation", identifier);
                break;
            }

            match self.poll_once().await {
                Ok(CycleOutcome::Unchanged) => {
                    debug!("{} balance unchanged", identifier);
                }
                Ok(CycleOutcome::Updated(snapshot)) => {
                    info!(
                        "\"{}\" ({}) balance updated from {} to {} sats",
                        snapshot.nickname,
                        identifier,
                        snapshot.previous_balance_sat,
                        snapshot.balance_sat
                    );
                }
                Err(CycleError::Cancelled) => {
                    info!("Watcher for {} cancelled mid cycle", identifier);
                    break;
                }
                Err(e @ CycleError::Setup(_)) => {
                    error!("Stopping watcher for {}: {}", identifier, e);
                    self.deregister().await;
                    break;
                }
                Err(e) => {
                    error!("Poll of {} failed: {}", identifier, e);
                }
            }

            tokio::select! {
                _ = sleep(self.context.sleep_interval) => continue,
                _ = self.handle.cancel_token.cancelled() => {
                    info!("Watcher for {} cancelled during sleep", identifier);
                    break;
                }
            }
        }

        self.handle.mark_stopped();
    }

    /// Runs one poll cycle: load the prior snapshot, fetch the current
    /// balance, and on a balance change persist and notify
    pub async fn poll_once(&self) -> Result<CycleOutcome, CycleError> {
        let prior = self.load_or_create_snapshot().await?;

        let (balance_sat, tx_count) = self.fetch_balance().await?;

        let balance_currency = match self
            .context
            .converter
            .convert(prior.currency, balance_sat)
            .await
        {
            Ok(amount) => amount,
            Err(e) => {
                warn!(
                    "unable to convert balance of {} to {}: {}",
                    balance_sat, prior.currency, e
                );
                ZERO_AMOUNT.to_string()
            }
        };

        let snapshot = prior.next(balance_sat, tx_count, balance_currency);
        if snapshot.balance_sat == prior.balance_sat {
            return Ok(CycleOutcome::Unchanged);
        }

        let _gate = self.handle.write_gate.lock().await;
        if self.handle.cancel_token.is_cancelled() {
            return Err(CycleError::Cancelled);
        }

        match self.context.store.update_snapshot(&snapshot).await {
            Ok(1) => debug!("stored new snapshot for {}", snapshot.identifier),
            Ok(rows) => error!(
                "{} rows affected updating snapshot for \"{}\" ({})",
                rows, snapshot.nickname, snapshot.identifier
            ),
            Err(e) => error!(
                "failed to store snapshot for \"{}\" ({}): {}",
                snapshot.nickname, snapshot.identifier, e
            ),
        }

        if let Err(e) = self.context.notifier.send(&render_message(&snapshot)).await {
            error!(
                "failed to send notification for \"{}\" ({}): {}",
                snapshot.nickname, snapshot.identifier, e
            );
        }

        Ok(CycleOutcome::Updated(snapshot))
    }

    async fn load_or_create_snapshot(&self) -> Result<BalanceSnapshot, CycleError> {
        let identifier = self.handle.identifier.as_str();
        if let Some(snapshot) = self
            .context
            .store
            .get_snapshot(identifier)
            .await
            .map_err(CycleError::Store)?
        {
            return Ok(snapshot);
        }

        warn!(
            "previous balance for \"{}\" ({}) was not found, creating an empty one",
            self.handle.nickname, identifier
        );
        let snapshot = BalanceSnapshot::zero(
            &self.handle.identifier,
            &self.handle.nickname,
            self.context.default_currency,
        );

        let _gate = self.handle.write_gate.lock().await;
        if self.handle.cancel_token.is_cancelled() {
            return Err(CycleError::Cancelled);
        }

        let rows = self
            .context
            .store
            .create_snapshot(&snapshot)
            .await
            .map_err(CycleError::Setup)?;
        if rows != 1 {
            error!(
                "{} rows affected creating snapshot for \"{}\" ({})",
                rows, self.handle.nickname, identifier
            );
        }

        Ok(snapshot)
    }

    async fn fetch_balance(&self) -> Result<(u64, u64), CycleError> {
        match &self.handle.identifier {
            Identifier::Address(address) => {
                match self.context.source.address_summary(address).await {
                    Ok(summary) => Ok((summary.balance_sat, summary.tx_count)),
                    Err(e) => {
                        error!("error fetching balance of {}: {}", address, e);
                        Ok((0, 0))
                    }
                }
            }
            Identifier::ExtendedKey(key) => {
                match self
                    .context
                    .scanner
                    .scan(key, &self.handle.cancel_token)
                    .await
                {
                    Ok(totals) => Ok((totals.balance_sat, totals.tx_count)),
                    Err(ScanError::Cancelled) => Err(CycleError::Cancelled),
                }
            }
        }
    }

    /// Removes this watcher's own handle, leaving any newer handle for the
    /// same identifier alone
    async fn deregister(&self) {
        let mut table = self.table.lock().await;
        let owned = table
            .get(self.handle.identifier.as_str())
            .is_some_and(|handle| handle.generation == self.handle.generation);
        if owned {
            table.remove(self.handle.identifier.as_str());
        }
    }
}
