//! Peer registry and credential store.
//!
//! The registry is the durable record of every federation peer: where it
//! lives, how to reach it, which data types it receives, and the live status
//! fields the link supervisor writes back. The credential store keeps the
//! write-only secrets (password and certificate blobs) next to it.
//!
//! Two kinds of callers touch this crate and they see different things:
//!
//! - The control API reads [`FederationPeer`] values, which carry presence
//!   flags for certificates and never the secrets themselves. It only
//!   writes configuration fields.
//! - The link supervisor reads [`PeerSnapshot`] values (secrets included)
//!   and is the only writer of `connection_status`, `last_connected`,
//!   `last_error` and the message counters.

mod credentials;
mod error;
mod model;
mod status;
mod store;
mod validate;

pub use credentials::{
    certificate_flags, load_credentials, store_certificate, CertificateFlags, PeerCredentials,
    StoredCertificate, MAX_CERT_BYTES,
};
pub use error::{RegistryError, ValidationError};
pub use model::{FederationPeer, PeerPage, PeerSnapshot, PeerSpec, PAGE_SIZE};
pub use status::{load_snapshot, load_snapshots, record_counters, record_status, reset_link_status, StatusChange};
pub use store::{create_peer, delete_peer, get_peer, list_peers, toggle_peer, update_peer};
pub use validate::PeerSpecInput;
