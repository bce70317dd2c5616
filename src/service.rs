use std::{
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use rocket::tokio::{
    select, spawn,
    sync::oneshot,
    time::{interval_at, Instant},
};
use serde_json::Value;

use crate::{
    container::{SessionContainer, SessionData},
    error::{SessionError, SessionResult},
    id_lock::IdLocks,
    options::SessionOptions,
    registry::SessionRegistry,
    session::Session,
    session_id::{generate_session_id, is_valid_session_id},
    storage::SessionStorage,
};

/// Result of looking up a session with [`SessionService::get`]
#[derive(Clone, Debug)]
pub enum Lookup {
    /// The session was found in memory or loaded from storage
    Found(Session),
    /// No session was found, so a new one was created for the given ID
    Created(Session),
    /// No session was found, and none was created
    Absent,
}

impl Lookup {
    pub fn session(&self) -> Option<&Session> {
        match self {
            Lookup::Found(session) | Lookup::Created(session) => Some(session),
            Lookup::Absent => None,
        }
    }

    pub fn into_session(self) -> Option<Session> {
        match self {
            Lookup::Found(session) | Lookup::Created(session) => Some(session),
            Lookup::Absent => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Lookup::Created(_))
    }
}

struct ServiceInner {
    registry: Arc<SessionRegistry>,
    storage: Arc<dyn SessionStorage>,
    options: SessionOptions,
    /// Serializes lookups of the same session ID
    id_locks: IdLocks,
    gc_shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

/**
The session service: mediates between the in-memory [`SessionRegistry`] and the
configured [`SessionStorage`], following the flush policy in [`SessionOptions`].

The service is cheap to clone - all clones share the same registry and storage.

# Example
```rust
use std::sync::Arc;
use rocket_session_store::{storage::memory::MemoryStorage, SessionOptions, SessionRegistry, SessionService};

# rocket::async_test(async {
let service = SessionService::new(
    Arc::new(SessionRegistry::new()),
    Arc::new(MemoryStorage),
    SessionOptions::default(),
);

let session = service.new_session().await.unwrap();
session.set("cart_id", "abc123").await.unwrap();
assert_eq!(session.get("cart_id").await, Some("abc123".into()));
# });
```
*/
#[derive(Clone)]
pub struct SessionService {
    inner: Arc<ServiceInner>,
}

impl SessionService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        storage: Arc<dyn SessionStorage>,
        options: SessionOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                registry,
                storage,
                options,
                id_locks: IdLocks::default(),
                gc_shutdown_tx: Mutex::default(),
            }),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Name of the configured storage implementation
    pub fn storage_name(&self) -> &'static str {
        self.inner.storage.name()
    }

    fn storage(&self) -> &dyn SessionStorage {
        self.inner.storage.as_ref()
    }

    fn handle(&self, id: &str) -> Session {
        Session::new(id, self.clone())
    }

    /// Get the session for the given ID, loading it from storage if needed. If
    /// `create` is set and no live session was found, a new empty session is
    /// created with that ID.
    pub async fn get(&self, id: &str, create: bool) -> SessionResult<Lookup> {
        Ok(match self.resolve(id, create).await? {
            Some((_, true)) => Lookup::Created(self.handle(id)),
            Some((_, false)) => Lookup::Found(self.handle(id)),
            None => Lookup::Absent,
        })
    }

    /// Create a new session with a freshly generated ID
    pub async fn new_session(&self) -> SessionResult<Session> {
        let id = generate_session_id()?;
        let container = Arc::new(SessionContainer::new(&id));
        self.allocate(&container).await;
        Ok(self.handle(&id))
    }

    /// Get the value of a session key. `None` if the key or the session doesn't exist.
    pub async fn get_key(&self, id: &str, key: &str) -> Option<Value> {
        match self.resolve(id, false).await {
            Ok(Some((container, _))) => container.get(key),
            Ok(None) => None,
            Err(e) => {
                rocket::debug!("Couldn't get key '{key}' of session '{id}': {e}");
                None
            }
        }
    }

    /// Set the value of a session key. Creates the session if needed.
    pub async fn set_key(&self, id: &str, key: &str, value: Value) -> SessionResult<()> {
        self.mutate(id, true, move |data| {
            data.insert(key.to_owned(), value);
        })
        .await?;
        Ok(())
    }

    /// Replace the value of a session key with the result of `f`, atomically with
    /// respect to other changes of the same session. Creates the session if needed.
    pub async fn update_key<F>(&self, id: &str, key: &str, f: F) -> SessionResult<Value>
    where
        F: FnOnce(Option<Value>) -> Value + Send,
    {
        let value = self
            .mutate(id, true, move |data| {
                let value = f(data.remove(key));
                data.insert(key.to_owned(), value.clone());
                value
            })
            .await?;
        value.ok_or(SessionError::NotFound)
    }

    /// Remove a session key, returning its previous value
    pub async fn remove_key(&self, id: &str, key: &str) -> SessionResult<Option<Value>> {
        Ok(self
            .mutate(id, false, move |data| data.remove(key))
            .await?
            .flatten())
    }

    /// Refresh the update time of a session without changing its data
    pub async fn touch(&self, id: &str) -> SessionResult<()> {
        self.mutate(id, false, |_| ())
            .await?
            .ok_or(SessionError::NotFound)
    }

    /// Close a session, removing it from memory and from storage. Storage errors
    /// are logged - the session is always gone from memory afterwards.
    pub async fn close(&self, id: &str) -> SessionResult<()> {
        if let Some(container) = self.registry().delete(id) {
            container.release();
            // wait for a flush that may still be writing this session
            let _flush_guard = container.lock_flush().await;
        }
        if is_valid_session_id(id) {
            if let Err(e) = self.storage().delete(id).await {
                rocket::warn!("Error while deleting stored session '{id}': {e}");
            }
        }
        Ok(())
    }

    /// Whether the session doesn't exist or holds no data
    pub async fn is_empty(&self, id: &str) -> bool {
        match self.resolve(id, false).await {
            Ok(Some((container, _))) => container.is_empty(),
            Ok(None) => true,
            Err(e) => {
                rocket::debug!("Couldn't get session '{id}': {e}");
                true
            }
        }
    }

    /// Write the in-memory copy of a session to storage. Empty sessions are skipped.
    /// Unless the storage keeps sessions in memory, the in-memory copy is released
    /// afterwards.
    pub async fn flush(&self, id: &str) -> SessionResult<()> {
        let container = self.registry().get(id).ok_or(SessionError::NotFound)?;
        self.flush_container(&container).await
    }

    /// Garbage collection: close expired sessions and flush sessions that haven't been
    /// updated for longer than the update time. Flush errors are logged and don't stop the sweep.
    pub async fn gc(&self) -> SessionResult<()> {
        let options = self.options();
        for container in self.registry().live() {
            let id = container.id();
            let age = container.age_secs();
            if options.is_expired(age) {
                rocket::debug!("Closing expired session '{id}'");
                self.close(&id).await?;
            } else if age > options.update_time as f64 {
                if let Err(e) = self.flush_container(&container).await {
                    rocket::warn!("Error while flushing session '{id}': {e}");
                }
            }
        }
        Ok(())
    }

    /// Flush every live session to storage. Returns the number of sessions that
    /// couldn't be flushed.
    pub async fn flush_all(&self) -> usize {
        let mut failed = 0;
        for container in self.registry().live() {
            if self.options().is_expired(container.age_secs()) {
                continue;
            }
            if let Err(e) = self.flush_container(&container).await {
                rocket::error!("Error while flushing session '{}': {e}", container.id());
                failed += 1;
            }
        }
        failed
    }

    /// Set up the storage, and start the periodic garbage collection if the
    /// update time is positive
    pub async fn startup(&self) -> SessionResult<()> {
        self.storage().setup().await?;
        self.start_gc();
        Ok(())
    }

    /// Stop garbage collection, flush all live sessions and tear down the storage
    pub async fn shutdown(&self) -> SessionResult<()> {
        self.stop_gc();
        let failed = self.flush_all().await;
        if failed > 0 {
            rocket::warn!("{failed} session(s) couldn't be flushed on shutdown");
        }
        self.storage().shutdown().await
    }

    /// Start the periodic garbage collection task, with the update time as the interval.
    /// Does nothing unless the update time is positive.
    pub fn start_gc(&self) {
        let Ok(secs) = u64::try_from(self.options().update_time) else {
            return;
        };
        if secs == 0 {
            return;
        }

        let period = Duration::from_secs(secs);
        let service = Arc::downgrade(&self.inner);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        spawn(async move {
            select! {
                _ = run_gc(service, period) => (),
                _ = shutdown_rx => {
                    rocket::debug!("Session garbage collection stopped");
                }
            }
        });
        let previous = self
            .inner
            .gc_shutdown_tx
            .lock()
            .expect("gc shutdown lock poisoned")
            .replace(shutdown_tx);
        if let Some(tx) = previous {
            let _ = tx.send(());
        }
    }

    pub fn stop_gc(&self) {
        let tx = self
            .inner
            .gc_shutdown_tx
            .lock()
            .expect("gc shutdown lock poisoned")
            .take();
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
    }

    /// Find the live in-memory copy of a session, or load it from storage. Returns
    /// the container and whether it was just created.
    async fn resolve(
        &self,
        id: &str,
        create: bool,
    ) -> SessionResult<Option<(Arc<SessionContainer>, bool)>> {
        if id.is_empty() {
            return Err(SessionError::BlankId);
        }
        if !is_valid_session_id(id) {
            return Err(SessionError::InvalidId);
        }
        let options = self.options();
        let _id_guard = self.inner.id_locks.lock(id).await;

        let mut current = self
            .registry()
            .get(id)
            .filter(|c| !options.is_expired(c.age_secs()));

        // in "immediate" mode, storage may hold a newer copy written by another process
        let mut loaded = false;
        if current.is_none() || options.update_time == 0 {
            let in_memory = current.clone();
            // the in-memory copy must not be flushed and evicted while storage is read
            let _flush_guard = match &in_memory {
                Some(container) => Some(container.lock_flush().await),
                None => None,
            };
            match self.storage().load(id).await {
                Ok(record) if options.is_expired(record.age_secs()) => {
                    rocket::debug!("Discarding expired stored session '{id}'");
                    if let Err(e) = self.storage().delete(id).await {
                        rocket::warn!("Error while deleting stored session '{id}': {e}");
                    }
                }
                Ok(record) => {
                    let is_newer = in_memory.as_ref().map_or(true, |c| {
                        c.is_released() || record.updated_at > c.updated_at()
                    });
                    if is_newer {
                        current = Some(Arc::new(SessionContainer::from_record(record)));
                        loaded = true;
                    }
                }
                Err(SessionError::NotFound | SessionError::Expired) => (),
                Err(e @ (SessionError::Serialization(_) | SessionError::Crypto(_))) => {
                    rocket::warn!("Ignoring unreadable stored session '{id}': {e}");
                }
                Err(e) => return Err(e),
            }
        }

        match current {
            Some(container) => {
                if loaded {
                    if let Some(previous) = self.registry().set(id, container.clone()) {
                        previous.release();
                    }
                }
                Ok(Some((container, false)))
            }
            None if create => {
                let container = Arc::new(SessionContainer::new(id));
                self.allocate(&container).await;
                Ok(Some((container, true)))
            }
            None => Ok(None),
        }
    }

    /// Register a new session, making room first in bounded-memory mode
    async fn allocate(&self, container: &Arc<SessionContainer>) {
        let options = self.options();
        if options.is_bounded() {
            self.close_expired().await;
            self.shrink_to(options.keep_in_memory_items.saturating_sub(1))
                .await;
        }

        let id = container.id();
        if let Some(previous) = self.registry().set(&id, container.clone()) {
            previous.release();
        }

        if options.is_eager() {
            if let Err(e) = self.flush_container(container).await {
                rocket::warn!("Error while flushing new session '{id}': {e}");
            }
        }
    }

    async fn close_expired(&self) {
        for container in self.registry().live() {
            if self.options().is_expired(container.age_secs()) {
                let _ = self.close(&container.id()).await;
            }
        }
    }

    /// Release the least recently updated sessions until at most `limit` are in memory.
    /// Sessions with data are flushed first; empty sessions are simply dropped.
    async fn shrink_to(&self, limit: usize) {
        let excess = self.registry().count().saturating_sub(limit);
        if excess == 0 {
            return;
        }

        let mut sessions = self.registry().snapshot();
        sessions.sort_by_key(|c| c.updated_at());
        for container in sessions.into_iter().take(excess) {
            let Some((record, revision)) = container.snapshot() else {
                continue;
            };
            if record.data.is_empty() {
                self.registry().delete_if(&record.id, |c| {
                    Arc::ptr_eq(c, &container) && c.release_if_unchanged(revision)
                });
            } else if let Err(e) = self.flush_container(&container).await {
                rocket::warn!("Error while flushing session '{}': {e}", record.id);
            }
        }
    }

    /// Run `f` on the session data, refresh the update time, and flush in "immediate"
    /// mode. Retries on a freshly resolved container if the one found was released by a
    /// concurrent flush or close, so no change is lost. `None` if there's no session
    /// and `create` isn't set.
    async fn mutate<F, R>(&self, id: &str, create: bool, mut f: F) -> SessionResult<Option<R>>
    where
        F: FnOnce(&mut SessionData) -> R + Send,
        R: Send,
    {
        loop {
            let Some((container, _)) = self.resolve(id, create).await? else {
                return Ok(None);
            };
            match container.modify(f) {
                Ok(result) => {
                    if self.options().is_eager() {
                        self.flush_container(&container).await?;
                    }
                    return Ok(Some(result));
                }
                Err(unused) => f = unused,
            }
        }
    }

    async fn flush_container(&self, container: &Arc<SessionContainer>) -> SessionResult<()> {
        let _flush_guard = container.lock_flush().await;
        let Some((record, revision)) = container.snapshot() else {
            return Ok(()); // released: closed, or already flushed and evicted
        };
        if record.data.is_empty() {
            return Ok(());
        }

        self.storage().save(&record).await?;

        if !self.storage().retains_in_memory() {
            // changes made during the save keep the session in memory
            self.registry().delete_if(&record.id, |c| {
                Arc::ptr_eq(c, container) && c.release_if_unchanged(revision)
            });
        }
        Ok(())
    }
}

async fn run_gc(service: Weak<ServiceInner>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let Some(inner) = service.upgrade() else {
            break;
        };
        let service = SessionService { inner };
        if let Err(e) = service.gc().await {
            rocket::warn!("Session garbage collection failed: {e}");
        }
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("storage", &self.storage_name())
            .field("sessions", &self.registry().count())
            .field("lifetime", &self.inner.options.lifetime)
            .field("update_time", &self.inner.options.update_time)
            .finish()
    }
}
