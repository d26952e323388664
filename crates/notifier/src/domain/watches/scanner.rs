use itertools::Itertools;
use log::{debug, warn};
use std::{ops::Add, sync::Arc};
use tokio_util::sync::CancellationToken;

use super::ScanError;
use crate::infra::explorer::BalanceSource;

/// A key is abandoned after this many page requests fail in a row
pub const MAX_CONSECUTIVE_PAGE_FAILURES: u32 = 3;

const DEFAULT_LOOKAHEAD: u64 = 20;

#[derive(Debug, Clone, Copy)]
pub struct ScanSettings {
    pub lookahead: u64,
    pub page_size: u64,
    pub max_pages: u64,
    pub check_all_pubkey_types: bool,
}

impl ScanSettings {
    pub fn new(lookahead: u64, page_size: u64, max_pages: u64, check_all_pubkey_types: bool) -> Self {
        if lookahead == 0 {
            warn!("lookahead of 0 would stop every scan immediately, using {}", DEFAULT_LOOKAHEAD);
        }
        Self {
            lookahead: if lookahead == 0 { DEFAULT_LOOKAHEAD } else { lookahead },
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
            check_all_pubkey_types,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanTotals {
    pub balance_sat: u64,
    pub tx_count: u64,
}

impl Add for ScanTotals {
    type Output = ScanTotals;

    fn add(self, other: ScanTotals) -> ScanTotals {
        ScanTotals {
            balance_sat: self.balance_sat + other.balance_sat,
            tx_count: self.tx_count + other.tx_count,
        }
    }
}

/// Heuristic gap limit: counts consecutive addresses whose tx count matches
/// the address checked right before them. Both chains are scanned, so the
/// limit is twice the lookahead.
#[derive(Debug)]
struct GapTracker {
    previous_tx_count: u64,
    unchanged: u64,
    limit: u64,
}

impl GapTracker {
    fn new(lookahead: u64) -> Self {
        Self {
            previous_tx_count: 0,
            unchanged: 0,
            limit: lookahead.saturating_mul(2),
        }
    }

    /// Returns true once the limit is exceeded
    fn observe(&mut self, tx_count: u64) -> bool {
        if tx_count == self.previous_tx_count {
            self.unchanged += 1;
        } else {
            self.unchanged = 0;
        }
        self.previous_tx_count = tx_count;
        self.unchanged > self.limit
    }
}

/// Totals balance and transaction count across the addresses derived from
/// an extended public key
#[derive(Clone)]
pub struct PubkeyScanner {
    source: Arc<dyn BalanceSource>,
    settings: ScanSettings,
}

impl PubkeyScanner {
    pub fn new(source: Arc<dyn BalanceSource>, settings: ScanSettings) -> Self {
        Self { source, settings }
    }

    pub async fn scan(
        &self,
        key: &str,
        cancel_token: &CancellationToken,
    ) -> Result<ScanTotals, ScanError> {
        let mut totals = ScanTotals::default();
        for variant in self.keys_to_scan(key).await {
            if cancel_token.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            let key_totals = self.scan_key(&variant, cancel_token).await?;
            debug!(
                "{}: {} sats over {} transactions",
                variant, key_totals.balance_sat, key_totals.tx_count
            );
            totals = totals + key_totals;
        }
        Ok(totals)
    }

    async fn keys_to_scan(&self, key: &str) -> Vec<String> {
        if !self.settings.check_all_pubkey_types {
            return vec![key.to_string()];
        }

        match self.source.extended_key_details(key).await {
            Ok(details) => std::iter::once(key.to_string())
                .chain(details.related_keys.into_iter().map(|related| related.key))
                .unique()
                .collect(),
            Err(e) => {
                warn!("unable to look up related keys of {}, scanning it alone: {}", key, e);
                vec![key.to_string()]
            }
        }
    }

    async fn scan_key(
        &self,
        key: &str,
        cancel_token: &CancellationToken,
    ) -> Result<ScanTotals, ScanError> {
        let page_size = self.settings.page_size;
        let mut totals = ScanTotals::default();
        let mut gap = GapTracker::new(self.settings.lookahead);
        let mut failed_pages = 0;

        for page_number in 0..self.settings.max_pages {
            if cancel_token.is_cancelled() {
                return Err(ScanError::Cancelled);
            }

            let offset = page_number * page_size;
            let page = match self.source.extended_key_page(key, page_size, offset).await {
                Ok(page) => {
                    failed_pages = 0;
                    page
                }
                Err(e) => {
                    failed_pages += 1;
                    warn!("error fetching addresses of {} at offset {}: {}", key, offset, e);
                    if failed_pages >= MAX_CONSECUTIVE_PAGE_FAILURES {
                        warn!("giving up on {} after {} failed pages", key, failed_pages);
                        return Ok(totals);
                    }
                    continue;
                }
            };

            if page.is_empty() {
                debug!("{} has no addresses past offset {}", key, offset);
                return Ok(totals);
            }

            // receive[i], change[i] pairs, leftovers of the longer chain follow
            for address in page
                .receive_addresses
                .into_iter()
                .interleave(page.change_addresses)
            {
                if cancel_token.is_cancelled() {
                    return Err(ScanError::Cancelled);
                }

                let summary = match self.source.address_summary(&address).await {
                    Ok(summary) => summary,
                    Err(e) => {
                        warn!("error fetching {} of {}: {}", address, key, e);
                        continue;
                    }
                };

                totals.balance_sat += summary.balance_sat;
                totals.tx_count += summary.tx_count;

                if gap.observe(summary.tx_count) {
                    debug!("gap limit reached for {} at {}", key, address);
                    return Ok(totals);
                }
            }
        }

        warn!(
            "stopped scanning {} after {} pages without reaching the gap limit",
            key, self.settings.max_pages
        );
        Ok(totals)
    }
}
