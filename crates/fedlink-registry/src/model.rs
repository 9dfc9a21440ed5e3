use crate::credentials::PeerCredentials;
use fedlink_types::{ConnectionStatus, DataTypeSet, Protocol};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of peers returned per page by [`crate::list_peers`].
pub const PAGE_SIZE: u32 = 20;

/// A validated peer configuration, as written by create and update.
#[derive(Clone, PartialEq, Eq)]
pub struct PeerSpec {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub protocol: Protocol,
    pub username: Option<String>,
    /// `None` keeps the stored password on update.
    pub password: Option<String>,
    pub notes: Option<String>,
    pub push_data_types: DataTypeSet,
    pub enabled: bool,
}

impl fmt::Debug for PeerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSpec")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("notes", &self.notes)
            .field("push_data_types", &self.push_data_types)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// A federation peer as exposed through the control API.
///
/// Secrets are never part of this type: certificates appear only as
/// presence flags and the password not at all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FederationPeer {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub protocol: Protocol,
    pub enabled: bool,
    pub has_ca_cert: bool,
    pub has_client_cert: bool,
    pub has_client_key: bool,
    pub username: Option<String>,
    pub push_data_types: DataTypeSet,
    pub connection_status: ConnectionStatus,
    /// RFC 3339 timestamp of the last successful handshake.
    pub last_connected: Option<String>,
    pub last_error: Option<String>,
    pub messages_sent: u64,
    pub messages_failed: u64,
    pub notes: Option<String>,
    /// Incremented on every configuration update.
    pub config_version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// One page of peers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerPage {
    pub results: Vec<FederationPeer>,
    /// Total number of pages; at least 1 even when the registry is empty.
    pub num_pages: u32,
    /// The page that was returned (1-based).
    pub page: u32,
    /// Total number of peers across all pages.
    pub total: u64,
}

/// Immutable copy of a peer's desired state, handed to the link supervisor.
///
/// Unlike [`FederationPeer`] this carries the password and certificate
/// blobs, so its `Debug` output redacts them.
#[derive(Clone)]
pub struct PeerSnapshot {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub protocol: Protocol,
    pub enabled: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub push_data_types: DataTypeSet,
    pub credentials: PeerCredentials,
    pub config_version: i64,
    /// Persisted counters, used to seed live statistics.
    pub messages_sent: u64,
    pub messages_failed: u64,
}

impl fmt::Debug for PeerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSnapshot")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("enabled", &self.enabled)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("push_data_types", &self.push_data_types)
            .field("credentials", &self.credentials)
            .field("config_version", &self.config_version)
            .finish()
    }
}
