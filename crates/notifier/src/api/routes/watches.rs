use axum::{
    extract::State,
    http::StatusCode,
    response::{ErrorResponse, IntoResponse},
    Json,
};
use log::{debug, error, warn};
use notifier_core::IdentifierKind;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::{
    domain::{BalanceSnapshot, Error, RegistryError, WatchedIdentifier},
    startup::AppState,
};

#[derive(Debug, Deserialize)]
pub struct AddWatch {
    pub identifier: String,
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
pub struct IdentifierRequest {
    pub identifier: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Balances {
    pub addresses: Vec<BalanceSnapshot>,
    pub pubkeys: Vec<BalanceSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Removed {
    pub removed: bool,
}

pub async fn add_watch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddWatch>,
) -> Result<impl IntoResponse, ErrorResponse> {
    match state.registry.watch(&body.identifier, &body.nickname).await {
        Ok(watched) => {
            debug!("added watch for {}", watched.identifier);
            Ok((StatusCode::CREATED, Json(json!({}))))
        }
        Err(e @ RegistryError::AlreadyWatched(_)) => {
            warn!("{}", e);
            Err(ErrorResponse::from(Error::from(e)))
        }
        Err(e) => {
            error!("error adding watch for {:?}: {}", body.identifier, e);
            Err(ErrorResponse::from(Error::from(e)))
        }
    }
}

pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IdentifierRequest>,
) -> Result<Json<BalanceSnapshot>, ErrorResponse> {
    let identifier = body.identifier.trim();
    let snapshot = state.store.get_snapshot(identifier).await.map_err(|e| {
        error!("error getting balance for {}: {}", identifier, e);
        ErrorResponse::from(e)
    })?;

    snapshot.map(Json).ok_or_else(|| {
        ErrorResponse::from(Error::NotFound(format!(
            "no balance found for {}",
            identifier
        )))
    })
}

pub async fn get_balances(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Balances>, ErrorResponse> {
    let snapshots = state.store.list_snapshots().await.map_err(|e| {
        error!("error listing balances: {}", e);
        ErrorResponse::from(e)
    })?;

    let (addresses, pubkeys): (Vec<_>, Vec<_>) = snapshots
        .into_iter()
        .partition(|snapshot| snapshot.kind == IdentifierKind::Address);

    Ok(Json(Balances { addresses, pubkeys }))
}

pub async fn get_watches(State(state): State<Arc<AppState>>) -> Json<Vec<WatchedIdentifier>> {
    Json(state.registry.list_watched().await)
}

pub async fn delete_identifier(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IdentifierRequest>,
) -> Result<Json<Removed>, ErrorResponse> {
    state
        .registry
        .unwatch(&body.identifier)
        .await
        .map(|removed| Json(Removed { removed }))
        .map_err(|e| {
            error!("error removing {:?}: {}", body.identifier, e);
            e.into()
        })
}
