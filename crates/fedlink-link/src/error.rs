use std::time::Duration;
use thiserror::Error;

/// Errors reading or writing length-prefixed frames.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("connection closed by peer")]
    Closed,

    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a connect attempt or a live session ended.
///
/// These never reach API callers; they are recorded as the peer's
/// `last_error`.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("connect to {address} failed: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("tls error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("unusable credentials: {0}")]
    Credentials(String),

    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("no traffic from peer for {0:?}")]
    HeartbeatTimeout(Duration),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error(transparent)]
    Wire(#[from] WireError),
}
