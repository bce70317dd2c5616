use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use rocket::tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async locks keyed by session ID. Entries only exist while the lock is held
/// or awaited.
#[derive(Default)]
pub(crate) struct IdLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl IdLocks {
    pub(crate) async fn lock(&self, id: &str) -> IdGuard<'_> {
        let lock = self.map().entry(id.to_owned()).or_default().clone();
        let guard = lock.lock_owned().await;
        IdGuard {
            locks: self,
            id: id.to_owned(),
            guard: Some(guard),
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.locks.lock().expect("id lock map poisoned")
    }
}

pub(crate) struct IdGuard<'a> {
    locks: &'a IdLocks,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.map();
        drop(self.guard.take());
        // only the map holds the lock: nobody else is waiting for this ID
        if locks.get(&self.id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&self.id);
        }
    }
}
