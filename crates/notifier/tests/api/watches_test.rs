use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::time::Duration;

use crate::helpers::{silent_notifier, spawn_app, MockNotifier, ADDRESS, XPUB};

#[sqlx::test(migrations = "./migrations/snapshots")]
async fn health_check_works(pool: SqlitePool) {
    let test_app = spawn_app(pool, silent_notifier());

    let (status, _) = test_app
        .request(Method::GET, "/api/v1/health_check", None)
        .await;

    assert_eq!(status, StatusCode::OK);
}

#[sqlx::test(migrations = "./migrations/snapshots")]
async fn add_watch_returns_created_and_lists_it(pool: SqlitePool) {
    let test_app = spawn_app(pool, silent_notifier());

    let (status, body) = test_app
        .request(
            Method::POST,
            "/api/v1/watch",
            Some(json!({"identifier": ADDRESS, "nickname": "cold"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({}));

    let (status, body) = test_app.request(Method::GET, "/api/v1/watches", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{"identifier": ADDRESS, "kind": "address", "nickname": "cold"}])
    );

    test_app.registry.shutdown();
}

#[sqlx::test(migrations = "./migrations/snapshots")]
async fn add_watch_twice_conflicts(pool: SqlitePool) {
    let test_app = spawn_app(pool, silent_notifier());
    let body = json!({"identifier": ADDRESS, "nickname": "cold"});

    let (status, _) = test_app
        .request(Method::POST, "/api/v1/watch", Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = test_app
        .request(Method::POST, "/api/v1/watch", Some(body))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains(ADDRESS));

    test_app.registry.shutdown();
}

#[sqlx::test(migrations = "./migrations/snapshots")]
async fn add_watch_rejects_blank_identifier(pool: SqlitePool) {
    let test_app = spawn_app(pool, silent_notifier());

    let (status, body) = test_app
        .request(
            Method::POST,
            "/api/v1/watch",
            Some(json!({"identifier": "   ", "nickname": "nothing"})),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert!(test_app.registry.list_watched().await.is_empty());
}

#[sqlx::test(migrations = "./migrations/snapshots")]
async fn get_balance_of_unknown_identifier_is_not_found(pool: SqlitePool) {
    let test_app = spawn_app(pool, silent_notifier());

    let (status, _) = test_app
        .request(
            Method::POST,
            "/api/v1/balance",
            Some(json!({"identifier": ADDRESS})),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "./migrations/snapshots")]
async fn get_balance_returns_initial_snapshot(pool: SqlitePool) {
    let test_app = spawn_app(pool, silent_notifier());
    test_app.registry.watch(ADDRESS, "cold").await.unwrap();

    let (status, body) = test_app
        .request(
            Method::POST,
            "/api/v1/balance",
            Some(json!({"identifier": ADDRESS})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["identifier"], ADDRESS);
    assert_eq!(body["nickname"], "cold");
    assert_eq!(body["balance_sat"], 0);
    assert_eq!(body["balance_currency"], "0.00");
    assert_eq!(body["currency"], "USD");

    test_app.registry.shutdown();
}

#[sqlx::test(migrations = "./migrations/snapshots")]
async fn get_balances_groups_by_kind(pool: SqlitePool) {
    let test_app = spawn_app(pool, silent_notifier());
    test_app.registry.watch(ADDRESS, "cold").await.unwrap();
    test_app.registry.watch(XPUB, "hardware").await.unwrap();

    let (status, body) = test_app.request(Method::GET, "/api/v1/balances", None).await;

    assert_eq!(status, StatusCode::OK);
    let addresses = body["addresses"].as_array().unwrap();
    let pubkeys = body["pubkeys"].as_array().unwrap();
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0]["identifier"], ADDRESS);
    assert_eq!(pubkeys.len(), 1);
    assert_eq!(pubkeys[0]["identifier"], XPUB);
    assert_eq!(pubkeys[0]["kind"], "extended_key");

    test_app.registry.shutdown();
}

#[sqlx::test(migrations = "./migrations/snapshots")]
async fn delete_identifier_is_idempotent(pool: SqlitePool) {
    let test_app = spawn_app(pool, silent_notifier());
    test_app.registry.watch(ADDRESS, "cold").await.unwrap();
    let body = json!({"identifier": ADDRESS});

    let (status, removed) = test_app
        .request(Method::DELETE, "/api/v1/identifier", Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed, json!({"removed": true}));

    let (status, removed) = test_app
        .request(Method::DELETE, "/api/v1/identifier", Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed, json!({"removed": false}));

    let (status, _) = test_app
        .request(Method::POST, "/api/v1/balance", Some(body))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(test_app.store.get_snapshot(ADDRESS).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations/snapshots")]
async fn balance_change_is_stored_and_notified(pool: SqlitePool) {
    let mut notifier = MockNotifier::new();
    notifier
        .expect_send()
        .withf(|message: &str| {
            message.starts_with("**Address Balance Changed**")
                && message.contains("Nickname: cold")
                && message.contains("New Balance (satoshis): 50000")
        })
        .times(1)
        .returning(|_| Ok(()));
    let test_app = spawn_app(pool, notifier);
    test_app.explorer.set_address(ADDRESS, 50_000, 1);

    let (status, _) = test_app
        .request(
            Method::POST,
            "/api/v1/watch",
            Some(json!({"identifier": ADDRESS, "nickname": "cold"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let mut body = Value::Null;
    for _ in 0..50 {
        let (_, balance) = test_app
            .request(
                Method::POST,
                "/api/v1/balance",
                Some(json!({"identifier": ADDRESS})),
            )
            .await;
        if balance["balance_sat"] == 50_000 {
            body = balance;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(body["balance_sat"], 50_000);
    assert_eq!(body["previous_balance_sat"], 0);
    assert_eq!(body["tx_count"], 1);
    assert_eq!(body["balance_currency"], "30.00");

    test_app.registry.shutdown();
    tokio::time::timeout(Duration::from_secs(2), test_app.registry.wait_for_watchers())
        .await
        .unwrap();
}
