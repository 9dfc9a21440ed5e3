//! Link-side access to the registry: snapshots out, status and counters in.

use crate::credentials::load_credentials;
use crate::error::RegistryError;
use crate::model::PeerSnapshot;
use fedlink_types::{ConnectionStatus, DataTypeSet, Protocol};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// A connection state transition reported by a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    /// A connect attempt has started.
    Connecting,
    /// The session is established. `at` is an RFC 3339 timestamp.
    Connected { at: String },
    /// The attempt or session failed with this error.
    Failed { error: String },
    /// The link was stopped.
    Disconnected,
}

impl StatusChange {
    /// The `connection_status` this change moves the peer into.
    pub fn status(&self) -> ConnectionStatus {
        match self {
            Self::Connecting => ConnectionStatus::Connecting,
            Self::Connected { .. } => ConnectionStatus::Connected,
            Self::Failed { .. } => ConnectionStatus::Error,
            Self::Disconnected => ConnectionStatus::Disconnected,
        }
    }
}

/// Applies a status change to a peer.
///
/// Returns `false` when the peer no longer exists, which happens when a
/// link reports after its peer was deleted.
///
/// A successful connection clears `last_error`; other transitions keep it so
/// the last failure stays visible while a retry is pending.
pub fn record_status(conn: &Connection, peer_id: i64, change: &StatusChange) -> Result<bool, RegistryError> {
    let status = change.status().as_str();
    let changed = match change {
        StatusChange::Connected { at } => conn.execute(
            "UPDATE federation_peers
             SET connection_status = ?1, last_connected = ?2, last_error = NULL
             WHERE id = ?3",
            params![status, at, peer_id],
        )?,
        StatusChange::Failed { error } => conn.execute(
            "UPDATE federation_peers
             SET connection_status = ?1, last_error = ?2
             WHERE id = ?3",
            params![status, error, peer_id],
        )?,
        StatusChange::Connecting | StatusChange::Disconnected => conn.execute(
            "UPDATE federation_peers SET connection_status = ?1 WHERE id = ?2",
            params![status, peer_id],
        )?,
    };
    Ok(changed > 0)
}

/// Persists a link's message counters.
///
/// Counters never move backwards: a stale flush racing a newer one cannot
/// lower the stored values.
pub fn record_counters(conn: &Connection, peer_id: i64, sent: u64, failed: u64) -> Result<bool, RegistryError> {
    let sent = i64::try_from(sent).unwrap_or(i64::MAX);
    let failed = i64::try_from(failed).unwrap_or(i64::MAX);
    let changed = conn.execute(
        "UPDATE federation_peers
         SET messages_sent = MAX(messages_sent, ?1),
             messages_failed = MAX(messages_failed, ?2)
         WHERE id = ?3",
        params![sent, failed, peer_id],
    )?;
    Ok(changed > 0)
}

/// Marks every peer as disconnected.
///
/// Run once at startup, before any link exists, to clear statuses left
/// behind by a previous process. Returns the number of peers reset.
pub fn reset_link_status(conn: &Connection) -> Result<usize, RegistryError> {
    let reset = conn.execute(
        "UPDATE federation_peers SET connection_status = 'disconnected'
         WHERE connection_status != 'disconnected'",
        [],
    )?;
    if reset > 0 {
        tracing::info!(count = reset, "reset stale link status");
    }
    Ok(reset)
}

const SNAPSHOT_COLUMNS: &str = "id, name, address, port, protocol, enabled, username, password,
    push_data_types, config_version, messages_sent, messages_failed";

/// Loads a snapshot of every peer, disabled ones included, with credentials.
pub fn load_snapshots(conn: &Connection) -> Result<Vec<PeerSnapshot>, RegistryError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM federation_peers ORDER BY id"
    ))?;
    let mut snapshots = stmt
        .query_map([], row_to_snapshot)?
        .collect::<Result<Vec<_>, _>>()?;
    for snapshot in &mut snapshots {
        snapshot.credentials = load_credentials(conn, snapshot.id)?;
    }
    Ok(snapshots)
}

/// Loads the snapshot of one peer.
///
/// # Errors
///
/// Returns [`RegistryError::NotFound`] if no peer has this id.
pub fn load_snapshot(conn: &Connection, peer_id: i64) -> Result<PeerSnapshot, RegistryError> {
    let mut snapshot = conn
        .query_row(
            &format!("SELECT {SNAPSHOT_COLUMNS} FROM federation_peers WHERE id = ?1"),
            params![peer_id],
            row_to_snapshot,
        )
        .optional()?
        .ok_or(RegistryError::NotFound(peer_id))?;
    snapshot.credentials = load_credentials(conn, peer_id)?;
    Ok(snapshot)
}

fn row_to_snapshot(row: &Row) -> rusqlite::Result<PeerSnapshot> {
    let port: i64 = row.get(3)?;
    let port = u16::try_from(port).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Integer, Box::new(e))
    })?;
    let protocol: String = row.get(4)?;
    let protocol = protocol.parse::<Protocol>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let push_json: String = row.get(8)?;
    let push_data_types: DataTypeSet = serde_json::from_str(&push_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let messages_sent: i64 = row.get(10)?;
    let messages_failed: i64 = row.get(11)?;

    Ok(PeerSnapshot {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        port,
        protocol,
        enabled: row.get(5)?,
        username: row.get(6)?,
        password: row.get(7)?,
        push_data_types,
        credentials: Default::default(),
        config_version: row.get(9)?,
        messages_sent: messages_sent.max(0) as u64,
        messages_failed: messages_failed.max(0) as u64,
    })
}
