use fedlink_db::{open_and_migrate, DbPool, DbRuntimeSettings};
use fedlink_registry::{
    create_peer, delete_peer, get_peer, list_peers, store_certificate, update_peer, PeerSpecInput,
    RegistryError, PAGE_SIZE,
};
use fedlink_types::{CertSlot, ConnectionStatus};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::NamedTempFile;

fn setup() -> (NamedTempFile, DbPool) {
    let file = NamedTempFile::new().expect("temp file");
    let path = file.path().to_str().expect("utf-8 path").to_string();
    let (pool, _) = open_and_migrate(&path, DbRuntimeSettings::default()).expect("init");
    (file, pool)
}

fn alpha_input() -> PeerSpecInput {
    serde_json::from_value(serde_json::json!({
        "name": "alpha",
        "address": "peer.example.com",
        "port": 8089,
        "protocol": "ssl",
        "push_data_types": ["cot", "chat"],
        "enabled": true
    }))
    .expect("valid input json")
}

#[test]
fn created_peer_is_listed_as_disconnected() {
    let (_file, pool) = setup();
    let conn = pool.get().unwrap();

    let spec = alpha_input().validate().unwrap();
    let created = create_peer(&conn, &spec).unwrap();

    let page = list_peers(&conn, 1, PAGE_SIZE).unwrap();
    assert_eq!(page.num_pages, 1);
    assert_eq!(page.results.len(), 1);
    let listed = &page.results[0];
    assert_eq!(listed.id, created.id);
    assert_eq!(listed.address, "peer.example.com");
    assert_eq!(listed.push_data_types.labels(), vec!["cot", "chat"]);
    assert_eq!(listed.connection_status, ConnectionStatus::Disconnected);
}

#[test]
fn invalid_input_persists_nothing() {
    let (_file, pool) = setup();
    let conn = pool.get().unwrap();

    let mut input = alpha_input();
    input.port = Some(70000);
    let err = input.validate().unwrap_err();
    assert_eq!(err.field, "port");

    assert_eq!(list_peers(&conn, 1, PAGE_SIZE).unwrap().total, 0);
}

#[test]
fn concurrent_updates_of_one_peer_both_land() {
    let (_file, pool) = setup();
    let id = {
        let conn = pool.get().unwrap();
        create_peer(&conn, &alpha_input().validate().unwrap()).unwrap().id
    };

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = ["first", "second"]
        .into_iter()
        .map(|name| {
            let pool = pool.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut conn = pool.get().unwrap();
                let mut input = alpha_input();
                input.name = name.to_string();
                let spec = input.validate().unwrap();
                barrier.wait();
                update_peer(&mut conn, id, &spec).unwrap()
            })
        })
        .collect();

    let mut versions: Vec<i64> = handles
        .into_iter()
        .map(|h| h.join().unwrap().config_version)
        .collect();
    versions.sort_unstable();
    assert_eq!(versions, vec![2, 3]);

    let conn = pool.get().unwrap();
    assert_eq!(get_peer(&conn, id).unwrap().config_version, 3);
}

#[test]
fn deleting_a_peer_removes_its_certificates() {
    let (_file, pool) = setup();
    let conn = pool.get().unwrap();
    let id = create_peer(&conn, &alpha_input().validate().unwrap()).unwrap().id;

    store_certificate(
        &conn,
        id,
        CertSlot::Ca,
        "ca.crt",
        b"-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n",
    )
    .unwrap();
    assert!(get_peer(&conn, id).unwrap().has_ca_cert);

    delete_peer(&conn, id).unwrap();
    assert!(matches!(get_peer(&conn, id), Err(RegistryError::NotFound(_))));
    let certs: i64 = conn
        .query_row("SELECT COUNT(*) FROM peer_certificates", [], |row| row.get(0))
        .unwrap();
    assert_eq!(certs, 0);
}
