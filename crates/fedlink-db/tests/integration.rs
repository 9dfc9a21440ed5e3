use fedlink_db::{open_and_migrate, DbRuntimeSettings};
use tempfile::NamedTempFile;

#[test]
fn file_database_is_shared_across_pooled_connections() {
    let file = NamedTempFile::new().expect("temp file");
    let path = file.path().to_str().expect("utf-8 path");

    let (pool, applied) =
        open_and_migrate(path, DbRuntimeSettings::default()).expect("init should succeed");
    assert!(applied > 0);

    let a = pool.get().expect("first connection");
    let b = pool.get().expect("second connection");
    a.execute(
        "INSERT INTO federation_peers (name, address, port, protocol) VALUES ('alpha', 'peer.example.com', 8089, 'ssl')",
        [],
    )
    .expect("insert should succeed");

    let count: i64 = b
        .query_row("SELECT COUNT(*) FROM federation_peers", [], |row| row.get(0))
        .expect("count should succeed");
    assert_eq!(count, 1);
}

#[test]
fn reopening_does_not_reapply_migrations() {
    let file = NamedTempFile::new().expect("temp file");
    let path = file.path().to_str().expect("utf-8 path");

    open_and_migrate(path, DbRuntimeSettings::default()).expect("first open");
    let (_, applied) = open_and_migrate(path, DbRuntimeSettings::default()).expect("second open");
    assert_eq!(applied, 0);
}

#[test]
fn deleting_a_peer_cascades_to_certificates() {
    let file = NamedTempFile::new().expect("temp file");
    let path = file.path().to_str().expect("utf-8 path");
    let (pool, _) = open_and_migrate(path, DbRuntimeSettings::default()).expect("init");
    let conn = pool.get().unwrap();

    conn.execute(
        "INSERT INTO federation_peers (name, address, port, protocol) VALUES ('alpha', 'h', 8089, 'ssl')",
        [],
    )
    .unwrap();
    let peer_id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO peer_certificates (peer_id, slot, filename, format, blob) VALUES (?1, 'ca', 'ca.pem', 'pem', x'2d2d')",
        [peer_id],
    )
    .unwrap();

    conn.execute("DELETE FROM federation_peers WHERE id = ?1", [peer_id])
        .unwrap();
    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM peer_certificates", [], |row| row.get(0))
        .unwrap();
    assert_eq!(remaining, 0);
}
