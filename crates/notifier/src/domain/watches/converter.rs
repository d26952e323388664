use log::debug;
use notifier_core::{convert_sats, Currency, ZERO_AMOUNT};
use std::sync::Arc;

use super::ConvertError;
use crate::infra::explorer::BalanceSource;

/// Converts satoshi balances with a freshly fetched price quote
#[derive(Clone)]
pub struct CurrencyConverter {
    source: Arc<dyn BalanceSource>,
}

impl CurrencyConverter {
    pub fn new(source: Arc<dyn BalanceSource>) -> Self {
        Self { source }
    }

    /// One quote is fetched per call and applied to every balance
    pub async fn convert_balances(
        &self,
        currency: Currency,
        balances_sat: &[u64],
    ) -> Result<Vec<String>, ConvertError> {
        let quote = self.source.price().await?;
        debug!("converting {} balances to {}", balances_sat.len(), currency);

        Ok(balances_sat
            .iter()
            .map(|balance| convert_sats(*balance, &quote, currency))
            .collect())
    }

    pub async fn convert(&self, currency: Currency, balance_sat: u64) -> Result<String, ConvertError> {
        let mut amounts = self.convert_balances(currency, &[balance_sat]).await?;
        Ok(amounts.pop().unwrap_or_else(|| ZERO_AMOUNT.to_string()))
    }
}
