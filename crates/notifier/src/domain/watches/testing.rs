use mockall::mock;
use notifier_core::PriceQuote;
use sqlx::SqlitePool;

use crate::{
    domain::SnapshotStore,
    infra::{
        db::DBConnection,
        explorer_mock::MockExplorer,
        webhook::{Error as WebhookError, Notify},
    },
};

mock! {
    pub Notifier {}

    #[async_trait::async_trait]
    impl Notify for Notifier {
        async fn send(&self, message: &str) -> Result<(), WebhookError>;
    }
}

pub const ADDRESS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

pub fn store(pool: SqlitePool) -> SnapshotStore {
    SnapshotStore::new(DBConnection::new_with_pools(
        "test".to_string(),
        ":memory:".to_string(),
        pool.clone(),
        pool,
    ))
}

pub fn explorer() -> MockExplorer {
    let explorer = MockExplorer::new();
    explorer.set_price(PriceQuote {
        usd: 60_000.0,
        eur: 50_000.0,
        gbp: 40_000.0,
        xau: 30.0,
    });
    explorer
}
