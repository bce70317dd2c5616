//! Session storage with Redis (and Redis-compatible databases)

use bon::Builder;
use fred::{
    prelude::{KeysInterface, Pool, Value},
    types::Expiration,
};
use rocket::async_trait;
use time::OffsetDateTime;

use crate::error::{SessionError, SessionResult};

use super::{interface::SessionStorage, RecordCodec, SessionRecord};

/**
Redis session storage using the [fred.rs](https://docs.rs/fred) crate.

Each session is stored as a Redis string holding the JSON payload (optionally
encrypted), under the key `<prefix><id>` (e.g.: `sess:abcdef...`). Keys expire
natively once the session lifetime has passed since the session's update time.

```rust,no_run
use fred::prelude::{Builder, ClientLike, Config};
use rocket_session_store::storage::{redis::RedisFredStorage, RecordCodec};

async fn setup_storage() -> RedisFredStorage {
    // Setup and initialize a fred.rs Redis pool.
    let redis_pool = Builder::default_centralized()
        .set_config(Config::from_url("redis://localhost").expect("Valid Redis URL"))
        .build_pool(4)
        .expect("Should build Redis pool");
    redis_pool.init().await.expect("Should initialize Redis pool");

    // Construct the storage
    RedisFredStorage::builder()
        .pool(redis_pool)
        .prefix("sess:")
        .codec(RecordCodec::plain())
        .lifetime(60 * 60)
        .build()
}
```
*/
#[derive(Builder)]
pub struct RedisFredStorage {
    /// The initialized fred.rs connection pool.
    pool: Pool,
    /// The prefix to use for session keys.
    #[builder(into, default = "sess:")]
    prefix: String,
    /// Encoding (and optional encryption) of stored payloads
    #[builder(default)]
    codec: RecordCodec,
    /// Session lifetime in seconds: keys expire this long after the session's update time (default: 1 hour)
    #[builder(default = 60 * 60)]
    lifetime: u64,
}

impl RedisFredStorage {
    fn session_key(&self, id: &str) -> String {
        format!("{}{id}", self.prefix)
    }
}

#[async_trait]
impl SessionStorage for RedisFredStorage {
    fn name(&self) -> &'static str {
        "RedisSessionStorage"
    }

    async fn load(&self, id: &str) -> SessionResult<SessionRecord> {
        let key = self.session_key(id);
        let value: Option<Value> = self.pool.get(&key).await?;
        let payload = value
            .and_then(|v| v.into_owned_bytes())
            .ok_or(SessionError::NotFound)?;
        let decoded = self.codec.decode(id, &payload)?;

        if decoded.updated_at.is_none() {
            // unknown age: restart the key's TTL from now
            let _: () = self.pool.expire(&key, self.lifetime as i64, None).await?;
        }
        Ok(decoded.or_updated_at(OffsetDateTime::now_utc()))
    }

    async fn save(&self, record: &SessionRecord) -> SessionResult<()> {
        let Some(ttl) = record.remaining_lifetime(self.lifetime) else {
            return Ok(()); // already expired
        };
        let payload = self.codec.encode(record)?;
        let _: () = self
            .pool
            .set(
                self.session_key(&record.id),
                Value::Bytes(payload.into()),
                Some(Expiration::PX(ttl.as_millis().max(1) as i64)),
                None,
                false,
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> SessionResult<()> {
        let _: () = self.pool.del(self.session_key(id)).await?;
        Ok(())
    }
}
