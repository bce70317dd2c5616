//! Session storage with Memcached

use std::sync::Arc;

use bon::Builder;
use memcache::{Client, MemcacheError};
use rocket::{async_trait, tokio::task::spawn_blocking};
use time::OffsetDateTime;

use crate::error::{SessionError, SessionResult};

use super::{interface::SessionStorage, RecordCodec, SessionRecord};

/// Memcached treats expirations above 30 days as a unix timestamp
const MAX_RELATIVE_EXPIRATION: u64 = 60 * 60 * 24 * 30;

/**
Memcached session storage using the [memcache](https://docs.rs/memcache) crate.

Each session is stored as an item holding the JSON payload (optionally encrypted),
keyed by the session ID. Items expire natively once the session lifetime has passed
since the session's update time. The client is blocking, so every request runs on
Rocket's blocking thread pool.

```rust,no_run
use rocket_session_store::storage::{memcached::MemcacheStorage, RecordCodec};

fn setup_storage() -> MemcacheStorage {
    let client = memcache::Client::connect("memcache://127.0.0.1:11211")
        .expect("Should connect to memcached");

    MemcacheStorage::builder()
        .client(client)
        .codec(RecordCodec::plain())
        .lifetime(60 * 60)
        .build()
}
```
*/
#[derive(Builder)]
pub struct MemcacheStorage {
    /// The connected memcache client
    #[builder(into)]
    client: Arc<Client>,
    /// Encoding (and optional encryption) of stored payloads
    #[builder(default)]
    codec: RecordCodec,
    /// Session lifetime in seconds: items expire this long after the session's update time (default: 1 hour)
    #[builder(default = 60 * 60)]
    lifetime: u64,
}

impl MemcacheStorage {
    /// Connect to the given servers. Addresses without a scheme get `memcache://`.
    pub async fn connect(servers: &[String]) -> SessionResult<Client> {
        let urls: Vec<String> = servers
            .iter()
            .map(|server| {
                if server.contains("://") {
                    server.to_owned()
                } else {
                    format!("memcache://{server}")
                }
            })
            .collect();
        if urls.is_empty() {
            return Err(SessionError::Config("No memcache servers configured".to_owned()));
        }
        spawn_blocking(move || Client::connect(urls))
            .await
            .map_err(|e| SessionError::Backend(Box::new(e)))?
            .map_err(SessionError::from)
    }

    /// Run a blocking client call on the blocking thread pool
    async fn call<T, F>(&self, f: F) -> SessionResult<T>
    where
        F: FnOnce(&Client) -> Result<T, MemcacheError> + Send + 'static,
        T: Send + 'static,
    {
        let client = self.client.clone();
        let result = spawn_blocking(move || f(&client))
            .await
            .map_err(|e| SessionError::Backend(Box::new(e)))?;
        Ok(result?)
    }

    /// Expiration in whole seconds, rounded up
    fn expiration(ttl: std::time::Duration) -> u32 {
        let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        secs.clamp(1, MAX_RELATIVE_EXPIRATION) as u32
    }
}

#[async_trait]
impl SessionStorage for MemcacheStorage {
    fn name(&self) -> &'static str {
        "MemcacheSessionStorage"
    }

    async fn load(&self, id: &str) -> SessionResult<SessionRecord> {
        let key = id.to_owned();
        let payload = self
            .call(move |client| client.get::<Vec<u8>>(&key))
            .await?
            .ok_or(SessionError::NotFound)?;
        let decoded = self.codec.decode(id, &payload)?;

        if decoded.updated_at.is_none() {
            // unknown age: restart the item's expiration from now
            let key = id.to_owned();
            let expiration = Self::expiration(std::time::Duration::from_secs(self.lifetime));
            self.call(move |client| client.touch(&key, expiration)).await?;
        }
        Ok(decoded.or_updated_at(OffsetDateTime::now_utc()))
    }

    async fn save(&self, record: &SessionRecord) -> SessionResult<()> {
        let Some(ttl) = record.remaining_lifetime(self.lifetime) else {
            return Ok(()); // already expired
        };
        let payload = self.codec.encode(record)?;
        let key = record.id.to_owned();
        let expiration = Self::expiration(ttl);
        self.call(move |client| client.set(&key, payload.as_slice(), expiration))
            .await
    }

    async fn delete(&self, id: &str) -> SessionResult<()> {
        let key = id.to_owned();
        self.call(move |client| client.delete(&key)).await?;
        Ok(())
    }
}
