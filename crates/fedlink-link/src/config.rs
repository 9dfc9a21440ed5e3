use crate::backoff::BackoffPolicy;
use std::time::Duration;

/// Tunables for link sessions and the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Budget for the TLS handshake plus authentication exchange.
    pub handshake_timeout: Duration,
    /// Budget for writing a single frame.
    pub write_timeout: Duration,
    /// How often a `ping` is sent on an idle session.
    pub heartbeat_interval: Duration,
    /// Inbound silence after which the session is declared dead.
    pub heartbeat_timeout: Duration,
    /// Reconnect delay policy.
    pub backoff: BackoffPolicy,
    /// Capacity of each peer's outbound queue.
    pub queue_depth: usize,
    /// Largest frame accepted from a peer.
    pub max_frame_bytes: usize,
    /// How long a stopped link may take to exit before it is aborted.
    pub shutdown_grace: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            backoff: BackoffPolicy::default(),
            queue_depth: 1024,
            max_frame_bytes: crate::wire::MAX_FRAME_BYTES,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}
