//! Audit log for federation peers.
//!
//! Every operator action on the registry and every link state change worth
//! a human's attention is appended to `audit_events`. The log is
//! append-only and keyed by a monotonically increasing sequence number.
//!
//! | Source | Event types |
//! |--------|-------------|
//! | Control API | `PEER_CREATED`, `PEER_UPDATED`, `PEER_DELETED`, `PEER_TOGGLED`, `CERTIFICATE_UPLOADED` |
//! | Link supervisor | `LINK_CONNECTED`, `LINK_FAILED`, `LINK_DISCONNECTED` |
//!
//! ```rust,ignore
//! use fedlink_observe::{emit_event, EventPayload};
//!
//! emit_event(&conn, Some(peer.id), &EventPayload::PeerToggled { enabled: false })?;
//! ```

mod error;
mod event;
mod store;

pub use error::ObserveError;
pub use event::{AuditEvent, EventPayload};
pub use store::{emit_event, query_events, EventFilter, DEFAULT_EVENT_LIMIT, MAX_EVENT_LIMIT};

#[cfg(test)]
mod tests;
