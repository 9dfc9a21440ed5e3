//! Unit tests for the audit log.

use rusqlite::Connection;

use crate::event::EventPayload;
use crate::store::{emit_event, query_events, EventFilter, MAX_EVENT_LIMIT};

fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("should open in-memory db");
    fedlink_db::run_migrations(&conn).expect("migrations should succeed");
    conn
}

// ── emit_event ───────────────────────────────────────────────────────

#[test]
fn emit_event_assigns_increasing_seq() {
    let conn = test_db();

    let first = emit_event(&conn, Some(1), &EventPayload::PeerToggled { enabled: false })
        .expect("emit should succeed");
    let second = emit_event(&conn, Some(2), &EventPayload::PeerDeleted)
        .expect("emit should succeed");

    assert_eq!(first.seq, 1);
    assert_eq!(second.seq, 2);
    assert_eq!(first.event_type, "PEER_TOGGLED");
    assert_eq!(second.event_type, "PEER_DELETED");
}

#[test]
fn stored_payload_round_trips() {
    let conn = test_db();
    let payload = EventPayload::PeerCreated {
        name: "alpha".into(),
        address: "peer.example.com".into(),
        port: 8089,
        protocol: "ssl".into(),
    };
    emit_event(&conn, Some(7), &payload).unwrap();

    let events = query_events(&conn, &EventFilter::default()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].peer_id, Some(7));
    assert_eq!(events[0].payload["name"], "alpha");

    let decoded: EventPayload = serde_json::from_value(events[0].payload.clone()).unwrap();
    assert_eq!(decoded, payload);
}

#[test]
fn events_outlive_their_peer() {
    let conn = test_db();
    // audit_events.peer_id has no foreign key; ids of deleted peers stay valid.
    emit_event(&conn, Some(404), &EventPayload::LinkDisconnected).unwrap();
    assert_eq!(query_events(&conn, &EventFilter::default()).unwrap().len(), 1);
}

// ── query_events ─────────────────────────────────────────────────────

#[test]
fn query_filters_by_peer_and_type() {
    let conn = test_db();
    emit_event(&conn, Some(1), &EventPayload::LinkFailed { error: "refused".into() }).unwrap();
    emit_event(&conn, Some(1), &EventPayload::LinkConnected { address: "h".into(), port: 1 }).unwrap();
    emit_event(&conn, Some(2), &EventPayload::LinkFailed { error: "timeout".into() }).unwrap();

    let peer_one = query_events(
        &conn,
        &EventFilter {
            peer_id: Some(1),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(peer_one.len(), 2);
    assert_eq!(peer_one[0].event_type, "LINK_CONNECTED", "newest first");

    let failures = query_events(
        &conn,
        &EventFilter {
            event_type: Some("LINK_FAILED".into()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|e| e.event_type == "LINK_FAILED"));
}

#[test]
fn query_pages_with_before_seq() {
    let conn = test_db();
    for enabled in [true, false, true, false, true] {
        emit_event(&conn, Some(1), &EventPayload::PeerToggled { enabled }).unwrap();
    }

    let page = query_events(
        &conn,
        &EventFilter {
            limit: Some(2),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(page.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![5, 4]);

    let next = query_events(
        &conn,
        &EventFilter {
            before_seq: Some(4),
            limit: Some(2),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(next.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 2]);
}

#[test]
fn limit_is_clamped() {
    let conn = test_db();
    emit_event(&conn, None, &EventPayload::PeerDeleted).unwrap();

    let zero = query_events(
        &conn,
        &EventFilter {
            limit: Some(0),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(zero.len(), 1);

    let huge = query_events(
        &conn,
        &EventFilter {
            limit: Some(MAX_EVENT_LIMIT * 10),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(huge.len(), 1);
}
