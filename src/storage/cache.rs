//! Expiring cache session storage (memcache semantics)

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use retainer::Cache;
use rocket::{
    async_trait,
    tokio::{select, spawn, sync::oneshot},
};
use time::OffsetDateTime;

use crate::error::{SessionError, SessionResult};

use super::{interface::SessionStorage, RecordCodec, SessionRecord};

/// Semi-durable storage provider with memcache semantics: serialized (and optionally
/// encrypted) session payloads are kept in an in-process expiring key/value cache,
/// whose entries expire together with their session. It uses the [retainer] crate to
/// create an async cache. Payloads survive eviction from the session registry,
/// but they aren't shared between processes and don't survive a restart.
pub struct CacheStorage {
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    cache: Arc<Cache<String, Vec<u8>>>,
    codec: RecordCodec,
    lifetime: u64,
}

impl CacheStorage {
    /// Create the storage instance.
    /// # Parameters
    /// * `codec` - Encoding (and optional encryption) of stored payloads.
    /// * `lifetime` - Session lifetime in seconds. Entries expire this long after the
    ///   session's update time.
    pub fn new(codec: RecordCodec, lifetime: u64) -> Self {
        Self {
            shutdown_tx: Mutex::default(),
            cache: Default::default(),
            codec,
            lifetime,
        }
    }
}

#[async_trait]
impl SessionStorage for CacheStorage {
    fn name(&self) -> &'static str {
        "CacheSessionStorage"
    }

    async fn load(&self, id: &str) -> SessionResult<SessionRecord> {
        let Some(entry) = self.cache.get(&id.to_owned()).await else {
            return Err(SessionError::NotFound);
        };
        let remaining = entry.expiration().remaining().ok_or(SessionError::Expired)?;
        let decoded = self.codec.decode(id, entry.as_slice())?;

        // entries expire `lifetime` seconds after the session's update time
        let lifetime = time::Duration::seconds(self.lifetime as i64);
        let written_at = OffsetDateTime::now_utc() - lifetime + remaining;
        Ok(decoded.or_updated_at(written_at))
    }

    async fn save(&self, record: &SessionRecord) -> SessionResult<()> {
        let Some(ttl) = record.remaining_lifetime(self.lifetime) else {
            return Ok(()); // already expired
        };
        let payload = self.codec.encode(record)?;
        self.cache.insert(record.id.to_owned(), payload, ttl).await;
        Ok(())
    }

    async fn delete(&self, id: &str) -> SessionResult<()> {
        self.cache.remove(&id.to_owned()).await;
        Ok(())
    }

    async fn setup(&self) -> SessionResult<()> {
        let cache = self.cache.clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        spawn(async move {
            select! {
                _ = cache.monitor(10, 0.25, Duration::from_secs(5 * 60)) => (),
                _ = shutdown_rx => {
                    rocket::debug!("Session cache monitor shutdown");
                }
            }
        });
        self.shutdown_tx
            .lock()
            .expect("cache shutdown lock poisoned")
            .replace(shutdown_tx);
        Ok(())
    }

    async fn shutdown(&self) -> SessionResult<()> {
        if let Some(tx) = self
            .shutdown_tx
            .lock()
            .expect("cache shutdown lock poisoned")
            .take()
        {
            let _ = tx.send(());
        }
        Ok(())
    }
}
