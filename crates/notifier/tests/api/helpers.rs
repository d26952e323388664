use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use mockall::mock;
use notifier::{
    app,
    domain::{ScanSettings, WatchContext},
    infra::explorer_mock::MockExplorer,
    AppState, DBConnection, Notify, SnapshotStore, WatchRegistry, WebhookError,
};
use notifier_core::{Currency, PriceQuote};
use serde_json::Value;
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower::ServiceExt;

mock! {
    pub Notifier {}

    #[async_trait]
    impl Notify for Notifier {
        async fn send(&self, message: &str) -> Result<(), WebhookError>;
    }
}

pub const ADDRESS: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
pub const XPUB: &str = "xpub6CUGRUonZSQ4TWtTMmzXdrXDtypWKiKrhko4egpiMZbpiaQL2jkwSB1icqYh2cfDfVxdx4df189oLKnC5fSwqPfgyP3hooxujYzAu3fDVmz";

pub struct TestApp {
    pub router: Router,
    pub explorer: MockExplorer,
    pub store: SnapshotStore,
    pub registry: Arc<WatchRegistry>,
}

pub fn silent_notifier() -> MockNotifier {
    let mut notifier = MockNotifier::new();
    notifier.expect_send().times(0);
    notifier
}

pub fn spawn_app(pool: SqlitePool, notifier: MockNotifier) -> TestApp {
    let store = SnapshotStore::new(DBConnection::new_with_pools(
        String::from("snapshots"),
        String::from(":memory:"),
        pool.clone(),
        pool,
    ));
    let explorer = MockExplorer::new();
    explorer.set_price(PriceQuote {
        usd: 60_000.0,
        eur: 50_000.0,
        gbp: 40_000.0,
        xau: 30.0,
    });

    let context = WatchContext::new(
        store.clone(),
        Arc::new(explorer.clone()),
        Arc::new(notifier),
        ScanSettings::new(20, 100, 5, false),
        Currency::Usd,
        Duration::from_millis(20),
    );
    let registry = Arc::new(WatchRegistry::new(
        context,
        CancellationToken::new(),
        TaskTracker::new(),
    ));

    let app_state = AppState {
        registry: registry.clone(),
        store: store.clone(),
    };

    TestApp {
        router: app(app_state, vec![String::from("http://localhost:9900")]),
        explorer,
        store,
        registry,
    }
}

impl TestApp {
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}
