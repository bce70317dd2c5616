use std::{
    collections::HashMap,
    ops::ControlFlow,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::container::SessionContainer;

/**
In-memory bookkeeping of all currently known sessions, keyed by session ID.

The lock only covers map access: it's never held while calling into a storage
backend or into a caller-supplied callback. Construct one at application start and
share it (behind an [`Arc`]) with the [`SessionService`](crate::SessionService).
*/
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionContainer>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<SessionContainer>> {
        self.read().get(id).cloned()
    }

    /// Insert or replace a session, returning the replaced one
    pub fn set(&self, id: &str, session: Arc<SessionContainer>) -> Option<Arc<SessionContainer>> {
        self.write().insert(id.to_owned(), session)
    }

    /// Remove a session. No-op if absent.
    pub fn delete(&self, id: &str) -> Option<Arc<SessionContainer>> {
        self.write().remove(id)
    }

    /// Remove a session only if `predicate` holds for the registered entry.
    /// The predicate runs under the registry lock and must not call back into the registry.
    pub(crate) fn delete_if<P>(&self, id: &str, predicate: P) -> bool
    where
        P: FnOnce(&Arc<SessionContainer>) -> bool,
    {
        let mut sessions = self.write();
        match sessions.get(id) {
            Some(session) if predicate(session) => {
                sessions.remove(id);
                true
            }
            _ => false,
        }
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// IDs of all registered sessions at the time of the call
    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Snapshot the registered IDs, then yield each session that's still registered
    /// when it's reached. The lock isn't held between items, so callers may `.await`
    /// or call back into the registry while iterating.
    pub fn live(&self) -> impl Iterator<Item = Arc<SessionContainer>> + '_ {
        self.ids().into_iter().filter_map(move |id| self.get(&id))
    }

    /// Run `action` on each live session, outside of the lock.
    /// Return [`ControlFlow::Break`] to stop early.
    pub fn for_each<F>(&self, mut action: F)
    where
        F: FnMut(Arc<SessionContainer>) -> ControlFlow<()>,
    {
        for session in self.live() {
            if action(session).is_break() {
                break;
            }
        }
    }

    /// Snapshot of all registered sessions, for callers that need to `.await` per entry
    pub fn snapshot(&self) -> Vec<Arc<SessionContainer>> {
        self.read().values().cloned().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<SessionContainer>>> {
        self.sessions.read().expect("session registry lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<SessionContainer>>> {
        self.sessions.write().expect("session registry lock poisoned")
    }
}
