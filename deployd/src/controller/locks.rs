//! Per-service serialization of enqueue requests

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async lock per service ID.
///
/// Only serializes callers sharing this process; other controller instances
/// can still interleave.
#[derive(Default)]
pub struct ServiceLocks {
    locks: StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ServiceLocks {
    /// Wait for exclusive access to `service_id`
    pub async fn lock(&self, service_id: Uuid) -> OwnedMutexGuard<()> {
        self.entry(service_id).lock_owned().await
    }

    fn entry(&self, service_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Entries nobody holds or waits on can go
        locks.retain(|id, lock| *id == service_id || Arc::strong_count(lock) > 1);
        locks
            .entry(service_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
