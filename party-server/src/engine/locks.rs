//! Per-party serialization point.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use party_core::PartyId;

/// Keyed async mutex: one lock per party id, created on demand.
///
/// Entries nobody holds or waits on are pruned on the next acquire, so the
/// map only grows with the number of parties being mutated concurrently.
#[derive(Default)]
pub struct PartyLocks {
    locks: Mutex<HashMap<PartyId, Arc<Mutex<()>>>>,
}

impl PartyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`. Released when the guard drops.
    pub async fn acquire(&self, id: &PartyId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|key, lock| key == id || Arc::strong_count(lock) > 1);
            locks
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
