use crate::{domain::Error, infra::db::DBConnection};

use super::BalanceSnapshot;

const SNAPSHOT_COLUMNS: &str = "identifier,
    kind,
    nickname,
    balance_sat,
    previous_balance_sat,
    balance_currency,
    previous_balance_currency,
    currency,
    tx_count";

fn to_db_int(value: u64, column: &str) -> Result<i64, Error> {
    i64::try_from(value)
        .map_err(|_| Error::BadRequest(format!("{} value {} is out of range", column, value)))
}

/// Snapshot persistence, one row per identifier
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    db_connection: DBConnection,
}

impl SnapshotStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn ping(&self) -> Result<(), Error> {
        self.db_connection.ping().await.map_err(Error::DbError)
    }

    pub async fn get_snapshot(&self, identifier: &str) -> Result<Option<BalanceSnapshot>, Error> {
        let snapshot = sqlx::query_as::<_, BalanceSnapshot>(&format!(
            "SELECT {} FROM balance_snapshot WHERE identifier = ?",
            SNAPSHOT_COLUMNS
        ))
        .bind(identifier)
        .fetch_optional(self.db_connection.read())
        .await?;

        Ok(snapshot)
    }

    pub async fn get_nickname(&self, identifier: &str) -> Result<Option<String>, Error> {
        let nickname: Option<String> =
            sqlx::query_scalar("SELECT nickname FROM balance_snapshot WHERE identifier = ?")
                .bind(identifier)
                .fetch_optional(self.db_connection.read())
                .await?;

        Ok(nickname)
    }

    /// Inserts the snapshot unless a row for the identifier already exists.
    /// Returns the number of rows written.
    pub async fn create_snapshot(&self, snapshot: &BalanceSnapshot) -> Result<u64, Error> {
        let snapshot = snapshot.clone();
        let balance_sat = to_db_int(snapshot.balance_sat, "balance_sat")?;
        let previous_balance_sat =
            to_db_int(snapshot.previous_balance_sat, "previous_balance_sat")?;
        let tx_count = to_db_int(snapshot.tx_count, "tx_count")?;

        let rows_affected = self
            .db_connection
            .execute_write(move |pool| async move {
                let result = sqlx::query(
                    "INSERT INTO balance_snapshot (
                        identifier,
                        kind,
                        nickname,
                        balance_sat,
                        previous_balance_sat,
                        balance_currency,
                        previous_balance_currency,
                        currency,
                        tx_count
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(identifier) DO NOTHING",
                )
                .bind(snapshot.identifier)
                .bind(snapshot.kind.as_str())
                .bind(snapshot.nickname)
                .bind(balance_sat)
                .bind(previous_balance_sat)
                .bind(snapshot.balance_currency)
                .bind(snapshot.previous_balance_currency)
                .bind(snapshot.currency.code())
                .bind(tx_count)
                .execute(&pool)
                .await?;
                Ok(result.rows_affected())
            })
            .await?;

        Ok(rows_affected)
    }

    /// Replaces the stored values for the snapshot's identifier. Returns the
    /// number of rows written, callers treat anything but 1 as an inconsistency.
    pub async fn update_snapshot(&self, snapshot: &BalanceSnapshot) -> Result<u64, Error> {
        let snapshot = snapshot.clone();
        let balance_sat = to_db_int(snapshot.balance_sat, "balance_sat")?;
        let previous_balance_sat =
            to_db_int(snapshot.previous_balance_sat, "previous_balance_sat")?;
        let tx_count = to_db_int(snapshot.tx_count, "tx_count")?;

        let rows_affected = self
            .db_connection
            .execute_write(move |pool| async move {
                let result = sqlx::query(
                    "UPDATE balance_snapshot
                     SET nickname = ?,
                         balance_sat = ?,
                         previous_balance_sat = ?,
                         balance_currency = ?,
                         previous_balance_currency = ?,
                         currency = ?,
                         tx_count = ?
                     WHERE identifier = ?",
                )
                .bind(snapshot.nickname)
                .bind(balance_sat)
                .bind(previous_balance_sat)
                .bind(snapshot.balance_currency)
                .bind(snapshot.previous_balance_currency)
                .bind(snapshot.currency.code())
                .bind(tx_count)
                .bind(snapshot.identifier)
                .execute(&pool)
                .await?;
                Ok(result.rows_affected())
            })
            .await?;

        Ok(rows_affected)
    }

    /// Returns whether a row was removed
    pub async fn delete_snapshot(&self, identifier: &str) -> Result<bool, Error> {
        let identifier = identifier.to_string();
        let rows_affected = self
            .db_connection
            .execute_write(move |pool| async move {
                let result = sqlx::query("DELETE FROM balance_snapshot WHERE identifier = ?")
                    .bind(identifier)
                    .execute(&pool)
                    .await?;
                Ok(result.rows_affected())
            })
            .await?;

        Ok(rows_affected > 0)
    }

    pub async fn list_snapshots(&self) -> Result<Vec<BalanceSnapshot>, Error> {
        let snapshots = sqlx::query_as::<_, BalanceSnapshot>(&format!(
            "SELECT {} FROM balance_snapshot ORDER BY identifier",
            SNAPSHOT_COLUMNS
        ))
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(snapshots)
    }
}
