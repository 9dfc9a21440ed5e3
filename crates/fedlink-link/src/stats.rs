use crate::wire::EncodedFrame;
use fedlink_types::{ConnectionStatus, DataType, DataTypeSet};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Point-in-time view of a link's live state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkCounters {
    pub status: ConnectionStatus,
    pub messages_sent: u64,
    pub messages_failed: u64,
}

/// Outcome of offering an event to one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    /// The peer is not connected or does not take this data type.
    NotRouted,
    Queued,
    /// The peer's queue was full; counted as failed.
    Rejected,
}

/// State shared between a peer's link task, the supervisor and the router.
///
/// Outlives individual sessions: it is created the first time a peer is
/// enabled and dropped only when the peer is deleted, so counters carry
/// over across reconnects and reconfiguration.
#[derive(Debug)]
pub(crate) struct LinkShared {
    status: AtomicU8,
    sent: AtomicU64,
    failed: AtomicU64,
    filter: AtomicU8,
    outbound: Mutex<Option<mpsc::Sender<EncodedFrame>>>,
}

impl LinkShared {
    pub(crate) fn new(sent: u64, failed: u64, filter: DataTypeSet) -> Self {
        Self {
            status: AtomicU8::new(ConnectionStatus::Disconnected.as_u8()),
            sent: AtomicU64::new(sent),
            failed: AtomicU64::new(failed),
            filter: AtomicU8::new(filter.bits()),
            outbound: Mutex::new(None),
        }
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub(crate) fn set_filter(&self, filter: DataTypeSet) {
        self.filter.store(filter.bits(), Ordering::Release);
    }

    pub(crate) fn accepts(&self, data_type: DataType) -> bool {
        DataTypeSet::from_bits(self.filter.load(Ordering::Acquire)).contains(data_type)
    }

    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self, n: u64) {
        if n > 0 {
            self.failed.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Raises the counters to at least the given values.
    pub(crate) fn seed(&self, sent: u64, failed: u64) {
        self.sent.fetch_max(sent, Ordering::Relaxed);
        self.failed.fetch_max(failed, Ordering::Relaxed);
    }

    pub(crate) fn counters(&self) -> LinkCounters {
        LinkCounters {
            status: self.status(),
            messages_sent: self.sent.load(Ordering::Relaxed),
            messages_failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn outbound(&self) -> MutexGuard<'_, Option<mpsc::Sender<EncodedFrame>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs the queue of a freshly established session.
    pub(crate) fn attach(&self, tx: mpsc::Sender<EncodedFrame>) {
        *self.outbound() = Some(tx);
    }

    pub(crate) fn detach(&self) {
        self.outbound().take();
    }

    /// Enqueues an event for this peer without blocking.
    pub(crate) fn offer(&self, data_type: DataType, frame: &EncodedFrame) -> Offer {
        if !self.accepts(data_type) || !self.is_connected() {
            return Offer::NotRouted;
        }
        let guard = self.outbound();
        let Some(tx) = guard.as_ref() else {
            return Offer::NotRouted;
        };
        match tx.try_send(EncodedFrame::clone(frame)) {
            Ok(()) => Offer::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.record_failed(1);
                Offer::Rejected
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Offer::NotRouted,
        }
    }
}
