//! Shared types and constants for the fedlink workspace.
//!
//! This crate holds the vocabulary every other crate speaks: the data types
//! a peer may receive, the transport protocol, the connection status state
//! machine labels, and the certificate slots of the credential store.
//!
//! Nothing here touches the database or the network, so the registry, the
//! link supervisor and the HTTP layer can all depend on it without pulling
//! in each other.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

mod data_types;

pub use data_types::DataTypeSet;

/// File extensions accepted for certificate uploads.
pub const ACCEPTED_CERT_EXTENSIONS: &[&str] = &["pem", "crt", "key", "cer", "p12", "pfx"];

/// Error returned when a wire or database label does not name a known value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseLabelError {
    /// What was being parsed (e.g. `"protocol"`).
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseLabelError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Categories of outbound traffic that can be pushed to a federation peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Cursor-on-Target position and event messages.
    Cot,
    /// Chat messages.
    Chat,
    /// Mission definitions and changes.
    Missions,
    /// Data package announcements.
    DataPackages,
    /// Video stream metadata.
    Video,
}

impl DataType {
    /// Every known data type, in canonical order.
    pub const ALL: [DataType; 5] = [
        DataType::Cot,
        DataType::Chat,
        DataType::Missions,
        DataType::DataPackages,
        DataType::Video,
    ];

    /// Returns the canonical lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cot => "cot",
            Self::Chat => "chat",
            Self::Missions => "missions",
            Self::DataPackages => "datapackages",
            Self::Video => "video",
        }
    }

    pub(crate) fn bit(self) -> u8 {
        match self {
            Self::Cot => 1 << 0,
            Self::Chat => 1 << 1,
            Self::Missions => 1 << 2,
            Self::DataPackages => 1 << 3,
            Self::Video => 1 << 4,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseLabelError::new("data type", s))
    }
}

/// Transport used to reach a federation peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain TCP.
    Tcp,
    /// TCP wrapped in TLS, optionally with a client certificate.
    Ssl,
}

impl Protocol {
    /// Returns the canonical lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Ssl => "ssl",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "ssl" => Ok(Self::Ssl),
            _ => Err(ParseLabelError::new("protocol", s)),
        }
    }
}

/// Connection state of a peer link.
///
/// Transitions are owned by the link supervisor:
///
/// ```text
/// disconnected -> connecting -> connected -> error -> connecting ...
/// connecting -> error
/// connected | connecting | error -> disconnected   (disable / delete)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No session and none being attempted.
    Disconnected,
    /// TCP connect, TLS handshake or authentication in progress.
    Connecting,
    /// Session established and healthy.
    Connected,
    /// Last attempt or session failed; a retry is scheduled.
    Error,
}

impl ConnectionStatus {
    /// Returns the canonical lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// Compact encoding used for lock-free status cells.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Error => 3,
        }
    }

    /// Inverse of [`ConnectionStatus::as_u8`]. Unknown codes map to `Disconnected`.
    pub fn from_u8(code: u8) -> Self {
        match code {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Error,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disconnected" => Ok(Self::Disconnected),
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "error" => Ok(Self::Error),
            _ => Err(ParseLabelError::new("connection status", s)),
        }
    }
}

/// Slot in the credential store a certificate upload targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertSlot {
    /// Trust anchor used to verify the peer.
    Ca,
    /// Client certificate (or PKCS#12 bundle) presented for mutual TLS.
    ClientCert,
    /// Private key matching the client certificate.
    ClientKey,
}

impl CertSlot {
    /// Every slot, in canonical order.
    pub const ALL: [CertSlot; 3] = [CertSlot::Ca, CertSlot::ClientCert, CertSlot::ClientKey];

    /// Returns the canonical snake_case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ca => "ca",
            Self::ClientCert => "client_cert",
            Self::ClientKey => "client_key",
        }
    }
}

impl fmt::Display for CertSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertSlot {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CertSlot::ALL
            .into_iter()
            .find(|slot| slot.as_str() == s)
            .ok_or_else(|| ParseLabelError::new("certificate type", s))
    }
}

/// Encoding of a stored certificate blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertFormat {
    /// Base64 armoured (`-----BEGIN ...`).
    Pem,
    /// Raw ASN.1 DER.
    Der,
    /// PKCS#12 archive (`.p12` / `.pfx`).
    Pkcs12,
}

impl CertFormat {
    /// Returns the canonical lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pem => "pem",
            Self::Der => "der",
            Self::Pkcs12 => "pkcs12",
        }
    }

    /// Classifies an upload from its file extension and leading bytes.
    ///
    /// Returns `None` when the extension is not accepted or the content
    /// is neither PEM armour nor a DER sequence.
    pub fn detect(extension: &str, data: &[u8]) -> Option<Self> {
        let ext = extension.to_ascii_lowercase();
        if !ACCEPTED_CERT_EXTENSIONS.contains(&ext.as_str()) {
            return None;
        }
        let is_der = data.first() == Some(&0x30);
        match ext.as_str() {
            "p12" | "pfx" => is_der.then_some(Self::Pkcs12),
            _ if looks_like_pem(data) => Some(Self::Pem),
            _ if is_der => Some(Self::Der),
            _ => None,
        }
    }
}

impl fmt::Display for CertFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertFormat {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pem" => Ok(Self::Pem),
            "der" => Ok(Self::Der),
            "pkcs12" => Ok(Self::Pkcs12),
            _ => Err(ParseLabelError::new("certificate format", s)),
        }
    }
}

fn looks_like_pem(data: &[u8]) -> bool {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    data[start..].starts_with(b"-----BEGIN ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_labels_round_trip() {
        for t in DataType::ALL {
            assert_eq!(t.as_str().parse::<DataType>(), Ok(t));
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn data_type_rejects_unknown_label() {
        let err = "telemetry".parse::<DataType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown data type: telemetry");
    }

    #[test]
    fn status_code_round_trip() {
        for status in [
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Error,
        ] {
            assert_eq!(ConnectionStatus::from_u8(status.as_u8()), status);
            assert_eq!(status.as_str().parse::<ConnectionStatus>(), Ok(status));
        }
        assert_eq!(ConnectionStatus::from_u8(200), ConnectionStatus::Disconnected);
    }

    #[test]
    fn protocol_parse() {
        assert_eq!("ssl".parse::<Protocol>(), Ok(Protocol::Ssl));
        assert_eq!("tcp".parse::<Protocol>(), Ok(Protocol::Tcp));
        assert!("SSL".parse::<Protocol>().is_err());
        assert!("udp".parse::<Protocol>().is_err());
    }

    #[test]
    fn cert_slot_labels() {
        assert_eq!("ca".parse::<CertSlot>(), Ok(CertSlot::Ca));
        assert_eq!("client_cert".parse::<CertSlot>(), Ok(CertSlot::ClientCert));
        assert_eq!("client_key".parse::<CertSlot>(), Ok(CertSlot::ClientKey));
        assert!("server_cert".parse::<CertSlot>().is_err());
    }

    #[test]
    fn cert_format_detection() {
        let pem = b"-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";
        let der = [0x30, 0x82, 0x01, 0x0a];

        assert_eq!(CertFormat::detect("pem", pem), Some(CertFormat::Pem));
        assert_eq!(CertFormat::detect("CRT", pem), Some(CertFormat::Pem));
        assert_eq!(CertFormat::detect("cer", &der), Some(CertFormat::Der));
        assert_eq!(CertFormat::detect("p12", &der), Some(CertFormat::Pkcs12));
        assert_eq!(CertFormat::detect("pfx", pem), None);
        assert_eq!(CertFormat::detect("txt", pem), None);
        assert_eq!(CertFormat::detect("key", b"not a key"), None);
        assert_eq!(CertFormat::detect("pem", b""), None);
    }
}
