//! CRUD operations on `federation_peers`.

use crate::error::RegistryError;
use crate::model::{FederationPeer, PeerPage, PeerSpec};
use fedlink_types::{ConnectionStatus, DataTypeSet, Protocol};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

/// Column list shared by every query that builds a [`FederationPeer`].
const PEER_COLUMNS: &str = "
    p.id, p.name, p.address, p.port, p.protocol, p.enabled,
    EXISTS(SELECT 1 FROM peer_certificates c WHERE c.peer_id = p.id AND c.slot = 'ca'),
    EXISTS(SELECT 1 FROM peer_certificates c WHERE c.peer_id = p.id AND c.slot = 'client_cert'),
    EXISTS(SELECT 1 FROM peer_certificates c WHERE c.peer_id = p.id AND c.slot = 'client_key'),
    p.username, p.push_data_types, p.connection_status, p.last_connected, p.last_error,
    p.messages_sent, p.messages_failed, p.notes, p.config_version, p.created_at, p.updated_at";

/// Inserts a new peer and returns it as stored.
///
/// The new peer starts `disconnected` with zeroed counters and
/// `config_version = 1`.
pub fn create_peer(conn: &Connection, spec: &PeerSpec) -> Result<FederationPeer, RegistryError> {
    let push_json = serde_json::to_string(&spec.push_data_types)?;

    conn.execute(
        "INSERT INTO federation_peers (
            name, address, port, protocol, enabled, username, password,
            push_data_types, notes
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            spec.name,
            spec.address,
            spec.port,
            spec.protocol.as_str(),
            spec.enabled,
            spec.username,
            spec.password,
            push_json,
            spec.notes,
        ],
    )?;
    let id = conn.last_insert_rowid();

    tracing::info!(peer_id = id, name = %spec.name, address = %spec.address, "created federation peer");
    get_peer(conn, id)
}

/// Retrieves a single peer.
///
/// # Errors
///
/// Returns [`RegistryError::NotFound`] if no peer has this id.
pub fn get_peer(conn: &Connection, id: i64) -> Result<FederationPeer, RegistryError> {
    conn.query_row(
        &format!("SELECT {PEER_COLUMNS} FROM federation_peers p WHERE p.id = ?1"),
        params![id],
        row_to_peer,
    )
    .optional()?
    .ok_or(RegistryError::NotFound(id))
}

/// Lists peers ordered by id, one page at a time.
///
/// `page` is 1-based; values below 1 are treated as 1. A page past the end
/// comes back empty with the real page count.
pub fn list_peers(conn: &Connection, page: u32, per_page: u32) -> Result<PeerPage, RegistryError> {
    let page = page.max(1);
    let per_page = per_page.max(1);

    let total: i64 = conn.query_row("SELECT COUNT(*) FROM federation_peers", [], |row| row.get(0))?;
    let total = total.max(0) as u64;
    let num_pages = total.div_ceil(u64::from(per_page)).max(1) as u32;
    let offset = i64::from(page - 1) * i64::from(per_page);

    let mut stmt = conn.prepare(&format!(
        "SELECT {PEER_COLUMNS} FROM federation_peers p ORDER BY p.id LIMIT ?1 OFFSET ?2"
    ))?;
    let results = stmt
        .query_map(params![per_page, offset], row_to_peer)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PeerPage {
        results,
        num_pages,
        page,
        total,
    })
}

/// Replaces a peer's configuration.
///
/// Runs inside an immediate transaction so concurrent updates of the same
/// peer serialise on the SQLite write lock. A `None` password keeps the
/// stored one. `config_version` is incremented on every call.
///
/// # Errors
///
/// Returns [`RegistryError::NotFound`] if no peer has this id.
pub fn update_peer(conn: &mut Connection, id: i64, spec: &PeerSpec) -> Result<FederationPeer, RegistryError> {
    let push_json = serde_json::to_string(&spec.push_data_types)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let changed = tx.execute(
        "UPDATE federation_peers SET
            name = ?1,
            address = ?2,
            port = ?3,
            protocol = ?4,
            enabled = ?5,
            username = ?6,
            password = COALESCE(?7, password),
            push_data_types = ?8,
            notes = ?9,
            config_version = config_version + 1,
            updated_at = datetime('now')
        WHERE id = ?10",
        params![
            spec.name,
            spec.address,
            spec.port,
            spec.protocol.as_str(),
            spec.enabled,
            spec.username,
            spec.password,
            push_json,
            spec.notes,
            id,
        ],
    )?;
    if changed == 0 {
        return Err(RegistryError::NotFound(id));
    }
    let peer = get_peer(&tx, id)?;
    tx.commit()?;

    tracing::info!(peer_id = id, config_version = peer.config_version, "updated federation peer");
    Ok(peer)
}

/// Deletes a peer and, by cascade, its certificates.
///
/// # Errors
///
/// Returns [`RegistryError::NotFound`] if no peer has this id; nothing is
/// changed in that case.
pub fn delete_peer(conn: &Connection, id: i64) -> Result<(), RegistryError> {
    let changed = conn.execute("DELETE FROM federation_peers WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(RegistryError::NotFound(id));
    }
    tracing::info!(peer_id = id, "deleted federation peer");
    Ok(())
}

/// Flips `enabled` and returns the new value.
pub fn toggle_peer(conn: &Connection, id: i64) -> Result<bool, RegistryError> {
    let enabled = conn
        .query_row(
            "UPDATE federation_peers
             SET enabled = NOT enabled, updated_at = datetime('now')
             WHERE id = ?1
             RETURNING enabled",
            params![id],
            |row| row.get::<_, bool>(0),
        )
        .optional()?
        .ok_or(RegistryError::NotFound(id))?;

    tracing::info!(peer_id = id, enabled, "toggled federation peer");
    Ok(enabled)
}

fn row_to_peer(row: &Row) -> rusqlite::Result<FederationPeer> {
    let port: i64 = row.get(3)?;
    let port = u16::try_from(port).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Integer, Box::new(e))
    })?;

    let protocol: String = row.get(4)?;
    let protocol = protocol.parse::<Protocol>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let push_json: String = row.get(10)?;
    let push_data_types: DataTypeSet = serde_json::from_str(&push_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let status: String = row.get(11)?;
    let connection_status = status.parse::<ConnectionStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let messages_sent: i64 = row.get(14)?;
    let messages_failed: i64 = row.get(15)?;

    Ok(FederationPeer {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        port,
        protocol,
        enabled: row.get(5)?,
        has_ca_cert: row.get(6)?,
        has_client_cert: row.get(7)?,
        has_client_key: row.get(8)?,
        username: row.get(9)?,
        push_data_types,
        connection_status,
        last_connected: row.get(12)?,
        last_error: row.get(13)?,
        messages_sent: messages_sent.max(0) as u64,
        messages_failed: messages_failed.max(0) as u64,
        notes: row.get(16)?,
        config_version: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedlink_types::DataType;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        fedlink_db::run_migrations(&conn).unwrap();
        conn
    }

    fn spec(name: &str) -> PeerSpec {
        PeerSpec {
            name: name.to_string(),
            address: "peer.example.com".to_string(),
            port: 8089,
            protocol: Protocol::Ssl,
            username: Some("fed".to_string()),
            password: Some("s3cret".to_string()),
            notes: None,
            push_data_types: DataTypeSet::from_types([DataType::Cot, DataType::Chat]),
            enabled: true,
        }
    }

    fn stored_password(conn: &Connection, id: i64) -> Option<String> {
        conn.query_row(
            "SELECT password FROM federation_peers WHERE id = ?1",
            [id],
            |r| r.get(0),
        )
        .unwrap()
    }

    #[test]
    fn create_returns_a_disconnected_peer() {
        let conn = setup();
        let peer = create_peer(&conn, &spec("alpha")).unwrap();
        assert_eq!(peer.name, "alpha");
        assert_eq!(peer.port, 8089);
        assert_eq!(peer.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(peer.config_version, 1);
        assert_eq!(peer.messages_sent, 0);
        assert!(!peer.has_ca_cert);
        assert_eq!(peer.push_data_types.labels(), vec!["cot", "chat"]);
    }

    #[test]
    fn list_pages_and_clamps() {
        let conn = setup();
        let empty = list_peers(&conn, 1, 20).unwrap();
        assert!(empty.results.is_empty());
        assert_eq!(empty.num_pages, 1);

        for i in 0..5 {
            create_peer(&conn, &spec(&format!("peer-{i}"))).unwrap();
        }
        let first = list_peers(&conn, 0, 2).unwrap();
        assert_eq!(first.page, 1);
        assert_eq!(first.num_pages, 3);
        assert_eq!(first.total, 5);
        assert_eq!(first.results[0].name, "peer-0");

        let last = list_peers(&conn, 3, 2).unwrap();
        assert_eq!(last.results.len(), 1);
        assert_eq!(last.results[0].name, "peer-4");

        let past_end = list_peers(&conn, 9, 2).unwrap();
        assert!(past_end.results.is_empty());
        assert_eq!(past_end.num_pages, 3);
    }

    #[test]
    fn update_keeps_password_when_absent() {
        let mut conn = setup();
        let peer = create_peer(&conn, &spec("alpha")).unwrap();

        let mut edit = spec("alpha-renamed");
        edit.password = None;
        let updated = update_peer(&mut conn, peer.id, &edit).unwrap();
        assert_eq!(updated.name, "alpha-renamed");
        assert_eq!(updated.config_version, 2);
        assert_eq!(stored_password(&conn, peer.id).as_deref(), Some("s3cret"));

        edit.password = Some("rotated".into());
        let updated = update_peer(&mut conn, peer.id, &edit).unwrap();
        assert_eq!(updated.config_version, 3);
        assert_eq!(stored_password(&conn, peer.id).as_deref(), Some("rotated"));
    }

    #[test]
    fn update_unknown_peer_is_not_found() {
        let mut conn = setup();
        let err = update_peer(&mut conn, 7, &spec("ghost")).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(7)));
    }

    #[test]
    fn delete_unknown_peer_leaves_registry_unchanged() {
        let conn = setup();
        create_peer(&conn, &spec("alpha")).unwrap();
        let err = delete_peer(&conn, 99).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(99)));
        assert_eq!(list_peers(&conn, 1, 20).unwrap().total, 1);
    }

    #[test]
    fn toggle_twice_restores_original() {
        let conn = setup();
        let peer = create_peer(&conn, &spec("alpha")).unwrap();
        assert!(!toggle_peer(&conn, peer.id).unwrap());
        assert!(toggle_peer(&conn, peer.id).unwrap());
        assert!(get_peer(&conn, peer.id).unwrap().enabled);
        assert!(matches!(
            toggle_peer(&conn, 404).unwrap_err(),
            RegistryError::NotFound(404)
        ));
    }
}
