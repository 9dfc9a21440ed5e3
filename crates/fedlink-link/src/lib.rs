//! Outbound federation links.
//!
//! The [`Supervisor`] runs one task per enabled peer. Each task connects
//! (plain TCP or TLS), authenticates when the peer has a username, then
//! streams queued events and heartbeats until the session fails or the
//! supervisor stops it. Failures are retried forever with jittered
//! exponential backoff.
//!
//! The [`Router`] fans events out to the queues of connected peers whose
//! push list includes the event's data type.
//!
//! Links never touch the database. State changes leave through a
//! [`StatusReport`] channel; counters are read with
//! [`Supervisor::counters`] and persisted by the caller.

mod backoff;
mod config;
mod error;
mod fingerprint;
mod router;
mod session;
mod stats;
mod supervisor;
mod tls;
pub mod wire;

pub use backoff::BackoffPolicy;
pub use config::LinkSettings;
pub use error::{LinkError, WireError};
pub use fingerprint::fingerprint;
pub use router::{OutboundEvent, PublishReport, Router};
pub use session::StatusReport;
pub use stats::LinkCounters;
pub use supervisor::{ReconcileSummary, Supervisor};
