use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use rocket::tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use serde_json::Value;
use time::OffsetDateTime;

use crate::storage::SessionRecord;

/// Session key/value data
pub type SessionData = HashMap<String, Value>;

struct ContainerState {
    id: String,
    data: SessionData,
    updated_at: OffsetDateTime,
    /// Bumped on every change that would be persisted
    revision: u64,
    /// Set once the container was evicted from the registry or closed. A released
    /// container must not be mutated anymore - its changes would never be flushed.
    released: bool,
}

/**
A single in-memory session record. All field access is synchronized with a
per-record lock, independent of the registry lock, so requests working on
different sessions never contend with each other.

`set` does not refresh the update time on its own: the
[`SessionService`](crate::SessionService) does that after a mutation.
*/
pub struct SessionContainer {
    state: Mutex<ContainerState>,
    flush_lock: AsyncMutex<()>,
}

impl SessionContainer {
    /// Create an empty session record, updated now
    pub fn new(id: &str) -> Self {
        Self::with_data(id, SessionData::new(), OffsetDateTime::now_utc())
    }

    pub fn with_data(id: &str, data: SessionData, updated_at: OffsetDateTime) -> Self {
        Self {
            state: Mutex::new(ContainerState {
                id: id.to_owned(),
                data,
                updated_at,
                revision: 0,
                released: false,
            }),
            flush_lock: AsyncMutex::new(()),
        }
    }

    pub fn from_record(record: SessionRecord) -> Self {
        Self::with_data(&record.id, record.data, record.updated_at)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().data.get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Value) {
        let mut state = self.lock();
        state.data.insert(key.to_owned(), value);
        state.revision += 1;
    }

    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    pub fn set_id(&self, id: &str) {
        let mut state = self.lock();
        state.id = id.to_owned();
        state.revision += 1;
    }

    pub fn updated_at(&self) -> OffsetDateTime {
        self.lock().updated_at
    }

    pub fn set_updated_at(&self, updated_at: OffsetDateTime) {
        let mut state = self.lock();
        state.updated_at = updated_at;
        state.revision += 1;
    }

    /// Seconds since the last update
    pub fn age_secs(&self) -> f64 {
        (OffsetDateTime::now_utc() - self.updated_at()).as_seconds_f64()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    /// Run `f` on the session data and refresh the update time, all under the record
    /// lock. If the container was already released, `f` is handed back without running.
    pub(crate) fn modify<F, R>(&self, f: F) -> Result<R, F>
    where
        F: FnOnce(&mut SessionData) -> R,
    {
        let mut state = self.lock();
        if state.released {
            return Err(f);
        }
        let result = f(&mut state.data);
        state.updated_at = OffsetDateTime::now_utc();
        state.revision += 1;
        Ok(result)
    }

    /// Copy of the record to be written to storage, along with its current revision.
    /// Returns `None` if the container was already released.
    pub(crate) fn snapshot(&self) -> Option<(SessionRecord, u64)> {
        let state = self.lock();
        if state.released {
            return None;
        }
        let record = SessionRecord {
            id: state.id.clone(),
            data: state.data.clone(),
            updated_at: state.updated_at,
        };
        Some((record, state.revision))
    }

    /// Release the container if nothing changed since the given revision
    pub(crate) fn release_if_unchanged(&self, revision: u64) -> bool {
        let mut state = self.lock();
        if state.released || state.revision != revision {
            return false;
        }
        state.released = true;
        true
    }

    pub(crate) fn release(&self) {
        self.lock().released = true;
    }

    /// Whether the container was evicted from the registry or closed
    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Serializes flushes of this record
    pub(crate) async fn lock_flush(&self) -> AsyncMutexGuard<'_, ()> {
        self.flush_lock.lock().await
    }

    fn lock(&self) -> MutexGuard<'_, ContainerState> {
        self.state.lock().expect("session record lock poisoned")
    }
}

impl std::fmt::Debug for SessionContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SessionContainer")
            .field("id", &state.id)
            .field("keys", &state.data.len())
            .field("updated_at", &state.updated_at)
            .finish()
    }
}
