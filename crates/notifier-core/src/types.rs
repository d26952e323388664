//! Identifier, currency and price types shared by the watch engine

use serde::{de, Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};

use crate::CoreError;

pub const SATS_PER_BITCOIN: u64 = 100_000_000;

/// Display amount used whenever a conversion could not be performed
pub const ZERO_AMOUNT: &str = "0.00";

/// Prefixes that mark an identifier as an extended public key
pub const EXTENDED_KEY_PREFIXES: [&str; 3] = ["xpub", "ypub", "zpub"];

/// The two kinds of things that can be watched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Address,
    ExtendedKey,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::ExtendedKey => "extended_key",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "address" => Ok(Self::Address),
            "extended_key" => Ok(Self::ExtendedKey),
            other => Err(CoreError::Validation(format!(
                "unknown identifier kind: {}",
                other
            ))),
        }
    }
}

/// A watched identifier, either a plain bitcoin address or an extended
/// public key (xpub/ypub/zpub). The inner string is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Identifier {
    Address(String),
    ExtendedKey(String),
}

impl Identifier {
    /// Classifies a raw string by prefix. Any string starting with `xpub`,
    /// `ypub` or `zpub` is an extended key, everything else is an address.
    pub fn classify(raw: &str) -> Self {
        if EXTENDED_KEY_PREFIXES
            .iter()
            .any(|prefix| raw.starts_with(prefix))
        {
            Self::ExtendedKey(raw.to_string())
        } else {
            Self::Address(raw.to_string())
        }
    }

    /// Trims and validates user input before classifying it
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        crate::validate_identifier(raw).map(Self::classify)
    }

    /// Rebuilds an identifier from its stored parts
    pub fn from_parts(kind: IdentifierKind, value: String) -> Self {
        match kind {
            IdentifierKind::Address => Self::Address(value),
            IdentifierKind::ExtendedKey => Self::ExtendedKey(value),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Address(value) | Self::ExtendedKey(value) => value,
        }
    }

    pub fn kind(&self) -> IdentifierKind {
        match self {
            Self::Address(_) => IdentifierKind::Address,
            Self::ExtendedKey(_) => IdentifierKind::ExtendedKey,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display currencies supported by the price quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Gbp,
    /// Troy ounces of gold
    Xau,
}

impl Currency {
    pub const ALL: [Currency; 4] = [Self::Usd, Self::Eur, Self::Gbp, Self::Xau];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Xau => "XAU",
        }
    }

    /// Lenient lookup used for stored values: unknown codes fall back to USD
    pub fn from_code_or_default(code: &str) -> Self {
        code.parse().unwrap_or_default()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        Self::ALL
            .into_iter()
            .find(|currency| currency.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| CoreError::UnknownCurrency(code.to_string()))
    }
}

impl TryFrom<String> for Currency {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.code().to_string()
    }
}

/// Price of one bitcoin in every supported currency
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceQuote {
    #[serde(deserialize_with = "flexible_f64")]
    pub usd: f64,
    #[serde(deserialize_with = "flexible_f64")]
    pub eur: f64,
    #[serde(deserialize_with = "flexible_f64")]
    pub gbp: f64,
    #[serde(deserialize_with = "flexible_f64")]
    pub xau: f64,
}

impl PriceQuote {
    pub fn rate(&self, currency: Currency) -> f64 {
        match currency {
            Currency::Usd => self.usd,
            Currency::Eur => self.eur,
            Currency::Gbp => self.gbp,
            Currency::Xau => self.xau,
        }
    }
}

/// Converts a satoshi balance into the quoted currency, rounded to two
/// decimal places and rendered as a fixed-point string.
pub fn convert_sats(balance_sat: u64, quote: &PriceQuote, currency: Currency) -> String {
    let bitcoin = balance_sat as f64 / SATS_PER_BITCOIN as f64;
    let amount = bitcoin * quote.rate(currency);
    format!("{:.2}", (amount * 100.0).round() / 100.0)
}

// Explorer price endpoints return either plain numbers or formatted strings
// such as "12,345.67".
fn flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(value) => Ok(value),
        NumberOrText::Text(text) => text
            .replace(',', "")
            .trim()
            .parse::<f64>()
            .map_err(|e| de::Error::custom(format!("invalid price {:?}: {}", text, e))),
    }
}
