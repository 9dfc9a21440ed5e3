//! Per-peer serialisation of Control API mutations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

/// Hands out one async lock per peer id.
///
/// Mutations of the same peer queue behind each other; different peers
/// never contend. Entries nobody holds are pruned on the next acquire.
#[derive(Debug, Clone, Default)]
pub struct PeerLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>>,
}

impl PeerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other mutation of `peer_id` is in flight.
    pub async fn acquire(&self, peer_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|id, lock| *id == peer_id || Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(peer_id).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_peer_waits_other_peer_does_not() {
        let locks = PeerLocks::new();
        let held = locks.acquire(1).await;

        let other = tokio::time::timeout(Duration::from_millis(100), locks.acquire(2)).await;
        assert!(other.is_ok(), "different peers must not contend");

        let same = tokio::time::timeout(Duration::from_millis(100), locks.acquire(1)).await;
        assert!(same.is_err(), "second mutation of peer 1 must wait");

        drop(held);
        let again = tokio::time::timeout(Duration::from_millis(100), locks.acquire(1)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = PeerLocks::new();
        drop(locks.acquire(1).await);
        drop(locks.acquire(2).await);
        let _guard = locks.acquire(3).await;
        assert_eq!(locks.len(), 1);
    }
}
