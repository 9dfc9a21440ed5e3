//! Control API handlers for federation peers.
//!
//! Every mutation runs under the peer's lock, commits to the registry,
//! appends an audit event and then nudges the reconcile loop. Link state
//! is never touched directly: the supervisor picks changes up from the
//! registry.

use crate::api::{blocking, ApiError};
use crate::{record_audit, AppState};
use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use fedlink_link::{OutboundEvent, PublishReport};
use fedlink_observe::EventPayload;
use fedlink_registry::{FederationPeer, PeerPage, PeerSpecInput, PAGE_SIZE};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
}

/// Handler for `GET /federations?page=N`.
///
/// Pages below 1 are treated as 1.
pub async fn list_peers_handler(
    Extension(state): Extension<Arc<AppState>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<PeerPage>, ApiError> {
    let Query(params) = params?;
    let page = params.page.unwrap_or(1).clamp(1, i64::from(u32::MAX)) as u32;

    let pool = state.pool.clone();
    let mut result = blocking(move || {
        let conn = pool.get()?;
        Ok(fedlink_registry::list_peers(&conn, page, PAGE_SIZE)?)
    })
    .await?;

    for peer in &mut result.results {
        state.overlay_live_counters(peer);
    }
    Ok(Json(result))
}

/// Handler for `GET /federations/{id}`.
pub async fn get_peer_handler(
    Extension(state): Extension<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<FederationPeer>, ApiError> {
    let Path(id) = id?;
    let pool = state.pool.clone();
    let mut peer = blocking(move || {
        let conn = pool.get()?;
        Ok(fedlink_registry::get_peer(&conn, id)?)
    })
    .await?;

    state.overlay_live_counters(&mut peer);
    Ok(Json(peer))
}

/// Handler for `POST /federations`.
pub async fn create_peer_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<PeerSpecInput>, JsonRejection>,
) -> Result<(StatusCode, Json<FederationPeer>), ApiError> {
    let Json(input) = payload?;
    let spec = input
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let pool = state.pool.clone();
    let peer = blocking(move || {
        let conn = pool.get()?;
        let peer = fedlink_registry::create_peer(&conn, &spec)?;
        record_audit(
            &conn,
            Some(peer.id),
            &EventPayload::PeerCreated {
                name: peer.name.clone(),
                address: peer.address.clone(),
                port: peer.port,
                protocol: peer.protocol.to_string(),
            },
        );
        Ok(peer)
    })
    .await?;

    tracing::info!(peer_id = peer.id, name = %peer.name, enabled = peer.enabled, "federation peer created");
    state.request_reconcile();
    Ok((StatusCode::CREATED, Json(peer)))
}

/// Handler for `PUT /federations/{id}`.
///
/// Replaces the whole configuration. An omitted or empty password keeps the
/// stored one.
pub async fn update_peer_handler(
    Extension(state): Extension<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<PeerSpecInput>, JsonRejection>,
) -> Result<Json<FederationPeer>, ApiError> {
    let Path(id) = id?;
    let Json(input) = payload?;
    let spec = input
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let _guard = state.peer_locks.acquire(id).await;
    let pool = state.pool.clone();
    let mut peer = blocking(move || {
        let mut conn = pool.get()?;
        let peer = fedlink_registry::update_peer(&mut conn, id, &spec)?;
        record_audit(
            &conn,
            Some(id),
            &EventPayload::PeerUpdated {
                name: peer.name.clone(),
                config_version: peer.config_version,
                password_changed: spec.password.is_some(),
            },
        );
        Ok(peer)
    })
    .await?;

    tracing::info!(peer_id = id, config_version = peer.config_version, "federation peer updated");
    state.request_reconcile();
    state.overlay_live_counters(&mut peer);
    Ok(Json(peer))
}

/// Handler for `DELETE /federations/{id}`.
pub async fn delete_peer_handler(
    Extension(state): Extension<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(id) = id?;

    let _guard = state.peer_locks.acquire(id).await;
    let pool = state.pool.clone();
    blocking(move || {
        let conn = pool.get()?;
        fedlink_registry::delete_peer(&conn, id)?;
        record_audit(&conn, Some(id), &EventPayload::PeerDeleted);
        Ok(())
    })
    .await?;

    tracing::info!(peer_id = id, "federation peer deleted");
    state.request_reconcile();
    Ok(Json(json!({ "status": "ok" })))
}

/// Handler for `POST /federations/{id}/toggle`.
pub async fn toggle_peer_handler(
    Extension(state): Extension<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(id) = id?;

    let _guard = state.peer_locks.acquire(id).await;
    let pool = state.pool.clone();
    let enabled = blocking(move || {
        let conn = pool.get()?;
        let enabled = fedlink_registry::toggle_peer(&conn, id)?;
        record_audit(&conn, Some(id), &EventPayload::PeerToggled { enabled });
        Ok(enabled)
    })
    .await?;

    tracing::info!(peer_id = id, enabled, "federation peer toggled");
    state.request_reconcile();
    Ok(Json(json!({ "enabled": enabled })))
}

/// Handler for `POST /federations/publish`.
///
/// Hands an event to the router and reports how many peer queues took it.
/// Delivery itself is asynchronous.
pub async fn publish_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<OutboundEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<PublishReport>), ApiError> {
    let Json(event) = payload?;
    let report = state.router.publish(event);
    Ok((StatusCode::ACCEPTED, Json(report)))
}
