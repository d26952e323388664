use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use notifier_core::PriceQuote;

use super::explorer::{
    AddressSummary, BalanceSource, DerivedAddressPage, Error, ExtendedKeyDetails, RelatedKey,
};

#[derive(Default)]
struct ExtendedKeyChain {
    receive: Vec<String>,
    change: Vec<String>,
    related: Vec<RelatedKey>,
}

#[derive(Default)]
struct MockState {
    addresses: HashMap<String, AddressSummary>,
    chains: HashMap<String, ExtendedKeyChain>,
    price: Option<PriceQuote>,
    failing_addresses: HashSet<String>,
    failing_pages: HashSet<(String, u64)>,
    failing_details: HashSet<String>,
    address_lookups: Vec<String>,
    page_requests: Vec<(String, u64)>,
}

/// In-memory explorer with programmable balances and derivation chains.
/// Unknown addresses report an empty summary, like an unused address would.
#[derive(Clone, Default)]
pub struct MockExplorer {
    state: Arc<RwLock<MockState>>,
}

impl MockExplorer {
    pub fn new() -> Self {
        let explorer = Self::default();
        explorer.set_price(PriceQuote {
            usd: 60_000.0,
            eur: 55_000.0,
            gbp: 47_000.0,
            xau: 25.0,
        });
        explorer
    }

    fn read<T>(&self, f: impl FnOnce(&MockState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    fn write<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub fn set_address(&self, address: &str, balance_sat: u64, tx_count: u64) {
        self.write(|state| {
            state.addresses.insert(
                address.to_string(),
                AddressSummary {
                    balance_sat,
                    tx_count,
                },
            )
        });
    }

    pub fn set_price(&self, quote: PriceQuote) {
        self.write(|state| state.price = Some(quote));
    }

    pub fn clear_price(&self) {
        self.write(|state| state.price = None);
    }

    /// Registers the receive and change chains derived from `key`
    pub fn set_chain(&self, key: &str, receive: Vec<String>, change: Vec<String>) {
        self.write(|state| {
            let chain = state.chains.entry(key.to_string()).or_default();
            chain.receive = receive;
            chain.change = change;
        });
    }

    pub fn set_related_keys(&self, key: &str, related: Vec<RelatedKey>) {
        self.write(|state| {
            state.chains.entry(key.to_string()).or_default().related = related;
        });
    }

    pub fn fail_address(&self, address: &str) {
        self.write(|state| state.failing_addresses.insert(address.to_string()));
    }

    pub fn fail_page(&self, key: &str, offset: u64) {
        self.write(|state| state.failing_pages.insert((key.to_string(), offset)));
    }

    pub fn fail_details(&self, key: &str) {
        self.write(|state| state.failing_details.insert(key.to_string()));
    }

    /// Every address looked up so far, in call order
    pub fn address_lookups(&self) -> Vec<String> {
        self.read(|state| state.address_lookups.clone())
    }

    /// Every `(key, offset)` page requested so far, in call order
    pub fn page_requests(&self) -> Vec<(String, u64)> {
        self.read(|state| state.page_requests.clone())
    }

    pub fn reset_calls(&self) {
        self.write(|state| {
            state.address_lookups.clear();
            state.page_requests.clear();
        });
    }
}

fn slice_page(chain: &[String], offset: usize, page_size: usize) -> Vec<String> {
    chain.iter().skip(offset).take(page_size).cloned().collect()
}

#[async_trait]
impl BalanceSource for MockExplorer {
    async fn address_summary(&self, address: &str) -> Result<AddressSummary, Error> {
        self.write(|state| {
            state.address_lookups.push(address.to_string());
            if state.failing_addresses.contains(address) {
                return Err(Error::Transient(format!("mock failure for {}", address)));
            }
            Ok(state.addresses.get(address).copied().unwrap_or_default())
        })
    }

    async fn price(&self) -> Result<PriceQuote, Error> {
        self.read(|state| {
            state
                .price
                .ok_or_else(|| Error::Transient(String::from("mock price unavailable")))
        })
    }

    async fn extended_key_details(&self, key: &str) -> Result<ExtendedKeyDetails, Error> {
        self.read(|state| {
            if state.failing_details.contains(key) {
                return Err(Error::Transient(format!("mock failure for {}", key)));
            }
            Ok(ExtendedKeyDetails {
                related_keys: state
                    .chains
                    .get(key)
                    .map(|chain| chain.related.clone())
                    .unwrap_or_default(),
            })
        })
    }

    async fn extended_key_page(
        &self,
        key: &str,
        page_size: u64,
        offset: u64,
    ) -> Result<DerivedAddressPage, Error> {
        self.write(|state| {
            state.page_requests.push((key.to_string(), offset));
            if state.failing_pages.contains(&(key.to_string(), offset)) {
                return Err(Error::Transient(format!(
                    "mock page failure for {} at {}",
                    key, offset
                )));
            }
            let Some(chain) = state.chains.get(key) else {
                return Ok(DerivedAddressPage::default());
            };
            Ok(DerivedAddressPage {
                receive_addresses: slice_page(&chain.receive, offset as usize, page_size as usize),
                change_addresses: slice_page(&chain.change, offset as usize, page_size as usize),
            })
        })
    }
}
