//! Audit log read handler.

use crate::api::{blocking, ApiError};
use crate::AppState;
use axum::{
    extract::rejection::QueryRejection,
    extract::{Extension, Query},
    Json,
};
use fedlink_observe::{AuditEvent, EventFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct EventsParams {
    pub peer_id: Option<i64>,
    pub event_type: Option<String>,
    /// Cursor: only events older than this sequence number.
    pub before_seq: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<AuditEvent>,
    pub count: usize,
}

/// Handler for `GET /federations/events`.
///
/// Returns events newest first.
pub async fn list_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    params: Result<Query<EventsParams>, QueryRejection>,
) -> Result<Json<EventsResponse>, ApiError> {
    let Query(params) = params?;
    let filter = EventFilter {
        peer_id: params.peer_id,
        event_type: params.event_type.filter(|t| !t.is_empty()),
        before_seq: params.before_seq,
        limit: params.limit,
    };

    let pool = state.pool.clone();
    let events = blocking(move || {
        let conn = pool.get()?;
        Ok(fedlink_observe::query_events(&conn, &filter)?)
    })
    .await?;

    Ok(Json(EventsResponse {
        count: events.len(),
        events,
    }))
}
