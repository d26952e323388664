mod store;

pub use store::*;

use notifier_core::{Currency, Identifier, IdentifierKind, ZERO_AMOUNT};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

/// Last known balance of one watched identifier. The `previous_*` fields hold
/// the values of the poll before the one that last changed the balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub identifier: String,
    pub kind: IdentifierKind,
    pub nickname: String,
    pub balance_sat: u64,
    pub previous_balance_sat: u64,
    pub balance_currency: String,
    pub previous_balance_currency: String,
    pub currency: Currency,
    pub tx_count: u64,
}

impl BalanceSnapshot {
    /// Snapshot stored the first time an identifier is watched
    pub fn zero(identifier: &Identifier, nickname: &str, currency: Currency) -> Self {
        Self {
            identifier: identifier.as_str().to_string(),
            kind: identifier.kind(),
            nickname: nickname.to_string(),
            balance_sat: 0,
            previous_balance_sat: 0,
            balance_currency: ZERO_AMOUNT.to_string(),
            previous_balance_currency: ZERO_AMOUNT.to_string(),
            currency,
            tx_count: 0,
        }
    }

    pub fn watched_identifier(&self) -> Identifier {
        Identifier::from_parts(self.kind, self.identifier.clone())
    }

    /// Builds the snapshot for a new poll result, shifting this snapshot's
    /// current values into the previous fields
    pub fn next(&self, balance_sat: u64, tx_count: u64, balance_currency: String) -> Self {
        Self {
            identifier: self.identifier.clone(),
            kind: self.kind,
            nickname: self.nickname.clone(),
            balance_sat,
            previous_balance_sat: self.balance_sat,
            balance_currency,
            previous_balance_currency: self.balance_currency.clone(),
            currency: self.currency,
            tx_count,
        }
    }
}

fn decode_u64(row: &SqliteRow, column: &str) -> Result<u64, sqlx::Error> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

impl FromRow<'_, SqliteRow> for BalanceSnapshot {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        let currency: String = row.try_get("currency")?;
        Ok(BalanceSnapshot {
            identifier: row.try_get("identifier")?,
            kind: kind.parse().map_err(|e| sqlx::Error::ColumnDecode {
                index: String::from("kind"),
                source: Box::new(e),
            })?,
            nickname: row.try_get("nickname")?,
            balance_sat: decode_u64(row, "balance_sat")?,
            previous_balance_sat: decode_u64(row, "previous_balance_sat")?,
            balance_currency: row.try_get("balance_currency")?,
            previous_balance_currency: row.try_get("previous_balance_currency")?,
            currency: Currency::from_code_or_default(&currency),
            tx_count: decode_u64(row, "tx_count")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_snapshot_is_blank() {
        let identifier = Identifier::classify("xpub6CUGRUo");
        let snapshot = BalanceSnapshot::zero(&identifier, "cold", Currency::Gbp);
        assert_eq!(snapshot.kind, IdentifierKind::ExtendedKey);
        assert_eq!(snapshot.balance_sat, 0);
        assert_eq!(snapshot.balance_currency, "0.00");
        assert_eq!(snapshot.previous_balance_currency, "0.00");
        assert_eq!(snapshot.currency, Currency::Gbp);
        assert_eq!(snapshot.watched_identifier(), identifier);
    }

    #[test]
    fn next_shifts_current_into_previous() {
        let identifier = Identifier::classify("bc1qcold");
        let first = BalanceSnapshot::zero(&identifier, "cold", Currency::Usd);
        let second = first.next(50_000, 1, String::from("30.00"));
        let third = second.next(20_000, 2, String::from("12.00"));

        assert_eq!(second.previous_balance_sat, 0);
        assert_eq!(second.previous_balance_currency, "0.00");
        assert_eq!(third.previous_balance_sat, 50_000);
        assert_eq!(third.previous_balance_currency, "30.00");
        assert_eq!(third.nickname, "cold");
        assert_eq!(third.tx_count, 2);
    }
}
