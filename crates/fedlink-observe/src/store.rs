//! Persistence operations for the audit log.
//!
//! All writes go through [`emit_event`], which assigns the sequence number
//! and inserts in a single statement. Reads go through [`query_events`].

use rusqlite::{params, Connection};

use crate::error::ObserveError;
use crate::event::{AuditEvent, EventPayload};

/// Number of events returned when the caller gives no limit.
pub const DEFAULT_EVENT_LIMIT: u32 = 100;

/// Upper bound on the number of events a single query returns.
pub const MAX_EVENT_LIMIT: u32 = 1000;

/// Appends an event to the audit log.
///
/// # Errors
///
/// Returns `ObserveError::Database` on SQL failure or
/// `ObserveError::Serialization` if the payload cannot be serialised.
pub fn emit_event(
    conn: &Connection,
    peer_id: Option<i64>,
    payload: &EventPayload,
) -> Result<AuditEvent, ObserveError> {
    let payload_json = serde_json::to_string(payload)?;
    let event_type = payload.event_type();

    // seq is computed inside the INSERT so two writers cannot observe the
    // same MAX(seq).
    let (id, seq, occurred_at) = conn.query_row(
        "INSERT INTO audit_events (seq, event_type, peer_id, payload_json, occurred_at)
         VALUES (
            (SELECT COALESCE(MAX(seq), 0) + 1 FROM audit_events),
            ?1, ?2, ?3, datetime('now')
         )
         RETURNING id, seq, occurred_at",
        params![event_type, peer_id, payload_json],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?)),
    )?;

    tracing::debug!(seq, event_type, ?peer_id, "audit event recorded");

    Ok(AuditEvent {
        id,
        seq,
        event_type: event_type.to_string(),
        peer_id,
        payload: serde_json::to_value(payload)?,
        occurred_at,
    })
}

/// Filter criteria for [`query_events`].
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only events about this peer.
    pub peer_id: Option<i64>,
    /// Only events of this type (e.g. `LINK_FAILED`).
    pub event_type: Option<String>,
    /// Only events with a sequence number below this one.
    pub before_seq: Option<i64>,
    /// Maximum number of events (default [`DEFAULT_EVENT_LIMIT`], capped at
    /// [`MAX_EVENT_LIMIT`]).
    pub limit: Option<u32>,
}

/// Queries the audit log, newest first.
///
/// Pass the smallest `seq` of one page as `before_seq` to fetch the next.
///
/// # Errors
///
/// Returns `ObserveError::Database` on SQL failure.
pub fn query_events(conn: &Connection, filter: &EventFilter) -> Result<Vec<AuditEvent>, ObserveError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(peer_id) = filter.peer_id {
        param_values.push(Box::new(peer_id));
        clauses.push(format!("peer_id = ?{}", param_values.len()));
    }

    if let Some(ref et) = filter.event_type {
        param_values.push(Box::new(et.clone()));
        clauses.push(format!("event_type = ?{}", param_values.len()));
    }

    if let Some(before) = filter.before_seq {
        param_values.push(Box::new(before));
        clauses.push(format!("seq < ?{}", param_values.len()));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let limit = filter
        .limit
        .unwrap_or(DEFAULT_EVENT_LIMIT)
        .clamp(1, MAX_EVENT_LIMIT);
    param_values.push(Box::new(limit));
    let sql = format!(
        "SELECT id, seq, event_type, peer_id, payload_json, occurred_at
         FROM audit_events
         {where_clause}
         ORDER BY seq DESC
         LIMIT ?{}",
        param_values.len()
    );

    let params_refs: Vec<&dyn rusqlite::types::ToSql> = param_values.iter().map(|p| &**p).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        let payload_json: String = row.get(4)?;
        let payload = serde_json::from_str(&payload_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(AuditEvent {
            id: row.get(0)?,
            seq: row.get(1)?,
            event_type: row.get(2)?,
            peer_id: row.get(3)?,
            payload,
            occurred_at: row.get(5)?,
        })
    })?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }

    Ok(events)
}
