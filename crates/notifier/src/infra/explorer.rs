use log::{debug, error};
use notifier_core::PriceQuote;
use reqwest_middleware::{
    reqwest::{StatusCode, Url},
    ClientWithMiddleware,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("problem sending request to explorer: {0}")]
    Send(#[from] reqwest_middleware::reqwest::Error),
    #[error("problem sending request to explorer: {0}")]
    SendRetry(#[from] reqwest_middleware::Error),
    #[error("problem requesting explorer: {0}")]
    Request(String),
    #[error("explorer temporarily unavailable: {0}")]
    Transient(String),
}

impl Error {
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSummary {
    pub balance_sat: u64,
    pub tx_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedKey {
    /// Encoding of the key, e.g. xpub, ypub, zpub
    pub key_type: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedKeyDetails {
    #[serde(default)]
    pub related_keys: Vec<RelatedKey>,
}

/// One page of addresses derived from an extended key, in derivation order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedAddressPage {
    #[serde(default)]
    pub receive_addresses: Vec<String>,
    #[serde(default)]
    pub change_addresses: Vec<String>,
}

impl DerivedAddressPage {
    pub fn is_empty(&self) -> bool {
        self.receive_addresses.is_empty() && self.change_addresses.is_empty()
    }
}

/// Source of chain data and prices. Every call may fail, callers decide how
/// to degrade.
#[async_trait::async_trait]
pub trait BalanceSource: Send + Sync {
    async fn address_summary(&self, address: &str) -> Result<AddressSummary, Error>;
    async fn price(&self) -> Result<PriceQuote, Error>;
    async fn extended_key_details(&self, key: &str) -> Result<ExtendedKeyDetails, Error>;
    async fn extended_key_page(
        &self,
        key: &str,
        page_size: u64,
        offset: u64,
    ) -> Result<DerivedAddressPage, Error>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressResponse {
    tx_history: TxHistory,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxHistory {
    #[serde(default)]
    balance_sat: u64,
    #[serde(default)]
    tx_count: u64,
}

/// Client for the btc-rpc-explorer REST api
#[derive(Clone)]
pub struct ExplorerClient {
    pub base_url: Url,
    pub client: ClientWithMiddleware,
    timeout: Duration,
}

impl ExplorerClient {
    pub fn new(client: ClientWithMiddleware, base_url: &Url, timeout: Duration) -> Self {
        // api paths are joined onto the base, so a path prefix must end in `/`
        let mut base_url = base_url.to_owned();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            client,
            timeout,
        }
    }

    async fn get<T>(&self, url: Url, not_found_message: String) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                error!("error sending to explorer: {}", e);
                Error::SendRetry(e)
            })?;

        let status = response.status();
        if status.is_success() {
            response.json::<T>().await.map_err(Into::into)
        } else if status == StatusCode::NOT_FOUND {
            Err(Error::NotFound(not_found_message))
        } else if status == StatusCode::SERVICE_UNAVAILABLE
            || status == StatusCode::BAD_GATEWAY
            || status == StatusCode::GATEWAY_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Transient(format!(
                "error response from explorer with status {}: {:?}",
                status, body
            )))
        } else {
            let body = response.text().await?;
            Err(Error::Request(format!(
                "error response from explorer with status {}: {:?}",
                status, body
            )))
        }
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Request(e.to_string()))
    }
}

#[async_trait::async_trait]
impl BalanceSource for ExplorerClient {
    async fn address_summary(&self, address: &str) -> Result<AddressSummary, Error> {
        let url = self.url(&format!("api/address/{}", address))?;
        let response: AddressResponse = self
            .get(url, format!("address {} not found", address))
            .await?;
        debug!(
            "address {}: {} sats over {} transactions",
            address, response.tx_history.balance_sat, response.tx_history.tx_count
        );

        Ok(AddressSummary {
            balance_sat: response.tx_history.balance_sat,
            tx_count: response.tx_history.tx_count,
        })
    }

    async fn price(&self) -> Result<PriceQuote, Error> {
        let url = self.url("api/price")?;
        self.get(url, String::from("price not found")).await
    }

    async fn extended_key_details(&self, key: &str) -> Result<ExtendedKeyDetails, Error> {
        let url = self.url(&format!("api/xyzpub/{}", key))?;
        self.get(url, format!("extended key {} not found", key))
            .await
    }

    async fn extended_key_page(
        &self,
        key: &str,
        page_size: u64,
        offset: u64,
    ) -> Result<DerivedAddressPage, Error> {
        let mut url = self.url(&format!("api/xyzpub/addresses/{}", key))?;
        url.query_pairs_mut()
            .append_pair("limit", &page_size.to_string())
            .append_pair("offset", &offset.to_string());

        self.get(url, format!("extended key {} not found", key))
            .await
    }
}
