//! Payload and record types for the audit log.

use serde::{Deserialize, Serialize};

/// Structured payloads, one variant per event type.
///
/// Stored as JSON in `audit_events.payload_json`. Never carries passwords
/// or certificate contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    // ── Control API ──────────────────────────────────────────────────
    /// A peer was added to the registry.
    PeerCreated {
        name: String,
        address: String,
        port: u16,
        protocol: String,
    },

    /// A peer's configuration was replaced.
    PeerUpdated {
        name: String,
        config_version: i64,
        /// Whether a new password was supplied.
        password_changed: bool,
    },

    /// A peer was removed from the registry.
    PeerDeleted,

    /// A peer was enabled or disabled.
    PeerToggled { enabled: bool },

    /// A certificate was stored in one of the peer's slots.
    CertificateUploaded {
        cert_type: String,
        filename: String,
        format: String,
    },

    // ── Link supervisor ──────────────────────────────────────────────
    /// A session was established.
    LinkConnected { address: String, port: u16 },

    /// A connect attempt or live session failed.
    LinkFailed { error: String },

    /// The link was stopped by disable, delete or shutdown.
    LinkDisconnected,
}

impl EventPayload {
    /// Returns the canonical event type string for this payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PeerCreated { .. } => "PEER_CREATED",
            Self::PeerUpdated { .. } => "PEER_UPDATED",
            Self::PeerDeleted => "PEER_DELETED",
            Self::PeerToggled { .. } => "PEER_TOGGLED",
            Self::CertificateUploaded { .. } => "CERTIFICATE_UPLOADED",
            Self::LinkConnected { .. } => "LINK_CONNECTED",
            Self::LinkFailed { .. } => "LINK_FAILED",
            Self::LinkDisconnected => "LINK_DISCONNECTED",
        }
    }
}

/// A single row from the `audit_events` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    /// Monotonically increasing sequence number.
    pub seq: i64,
    pub event_type: String,
    /// Peer the event concerns. Kept after the peer is deleted.
    pub peer_id: Option<i64>,
    pub payload: serde_json::Value,
    /// `YYYY-MM-DD HH:MM:SS` UTC timestamp.
    pub occurred_at: String,
}
