//! Fedlink server library.
//!
//! Hosts the Control API over the peer registry and wires it to the link
//! supervisor and message router. The binary in `main.rs` owns startup,
//! the background tasks in [`background`] and shutdown.

pub mod api;
pub mod api_certs;
pub mod api_events;
pub mod api_federations;
pub mod background;
pub mod config;
mod locks;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use fedlink_db::DbPool;
use fedlink_link::Supervisor;
use fedlink_observe::EventPayload;
use fedlink_registry::FederationPeer;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;

pub use locks::PeerLocks;

/// Application state shared across request handlers and background tasks.
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Owner of every outbound federation link.
    pub supervisor: Supervisor,
    /// Fans published events out to connected peers.
    pub router: fedlink_link::Router,
    /// Wakes the reconcile loop ahead of its next tick.
    pub reconcile: Arc<Notify>,
    /// Serialises mutations of the same peer.
    pub peer_locks: PeerLocks,
}

impl AppState {
    pub fn new(pool: DbPool, supervisor: Supervisor) -> Self {
        Self {
            router: fedlink_link::Router::new(&supervisor),
            pool,
            supervisor,
            reconcile: Arc::new(Notify::new()),
            peer_locks: PeerLocks::new(),
        }
    }

    /// Asks the reconcile loop to run now instead of at its next tick.
    pub fn request_reconcile(&self) {
        self.reconcile.notify_one();
    }

    /// Replaces persisted counters with the live ones when those are ahead.
    ///
    /// Persisted counters lag by up to one reconcile interval.
    pub fn overlay_live_counters(&self, peer: &mut FederationPeer) {
        if let Some(live) = self.supervisor.counters_for(peer.id) {
            peer.messages_sent = peer.messages_sent.max(live.messages_sent);
            peer.messages_failed = peer.messages_failed.max(live.messages_failed);
        }
    }
}

/// Appends an entry to the audit log.
///
/// Failures are logged as warnings and never fail the caller: the registry
/// change the event describes has already been committed.
pub fn record_audit(conn: &rusqlite::Connection, peer_id: Option<i64>, payload: &EventPayload) {
    if let Err(e) = fedlink_observe::emit_event(conn, peer_id, payload) {
        tracing::warn!(
            event_type = payload.event_type(),
            ?peer_id,
            "failed to record audit event: {}",
            e
        );
    }
}

/// Maximum body size for JSON peer specifications.
const MAX_REQUEST_BODY_BYTES: usize = 256 * 1024;

/// Multipart framing allowance on top of the certificate itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: Arc<AppState>) -> Router {
    let upload_routes = Router::new()
        .route(
            "/federations/{id}/upload_cert",
            post(api_certs::upload_cert_handler),
        )
        .layer(DefaultBodyLimit::max(
            fedlink_registry::MAX_CERT_BYTES + MULTIPART_OVERHEAD_BYTES,
        ));

    let publish_routes = Router::new()
        .route(
            "/federations/publish",
            post(api_federations::publish_handler),
        )
        .layer(DefaultBodyLimit::max(fedlink_link::wire::MAX_FRAME_BYTES));

    Router::new()
        .route("/health", get(health))
        .route(
            "/federations",
            get(api_federations::list_peers_handler).post(api_federations::create_peer_handler),
        )
        .route("/federations/events", get(api_events::list_events_handler))
        .route(
            "/federations/{id}",
            get(api_federations::get_peer_handler)
                .put(api_federations::update_peer_handler)
                .delete(api_federations::delete_peer_handler),
        )
        .route(
            "/federations/{id}/toggle",
            post(api_federations::toggle_peer_handler),
        )
        .merge(upload_routes)
        .merge(publish_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}
