//! Storage implementations for sessions

mod interface;
mod record;
pub use interface::*;
pub use record::*;

pub mod cache;
pub mod filesystem;
pub mod memory;

#[cfg(feature = "memcache")]
pub mod memcached;
#[cfg(feature = "redis_fred")]
pub mod redis;

use std::sync::Arc;

use crate::{
    error::SessionResult,
    options::{SessionOptions, StorageKind},
};

/// Build the storage backend selected by [`SessionOptions::storage`]. For Redis and
/// Memcache, this also connects to the configured servers.
pub async fn from_options(options: &SessionOptions) -> SessionResult<Arc<dyn SessionStorage>> {
    let codec = RecordCodec::from_options(options);
    let storage: Arc<dyn SessionStorage> = match options.storage {
        StorageKind::Memory => Arc::new(memory::MemoryStorage),
        StorageKind::Filesystem => Arc::new(
            filesystem::FilesystemStorage::builder()
                .folder(&options.storage_folder)
                .codec(codec)
                .lifetime(options.lifetime)
                .build(),
        ),
        StorageKind::Cache => Arc::new(cache::CacheStorage::new(codec, options.lifetime)),
        #[cfg(feature = "memcache")]
        StorageKind::Memcache => {
            let client = memcached::MemcacheStorage::connect(&options.memcache_servers).await?;
            Arc::new(
                memcached::MemcacheStorage::builder()
                    .client(client)
                    .codec(codec)
                    .lifetime(options.lifetime)
                    .build(),
            )
        }
        #[cfg(not(feature = "memcache"))]
        StorageKind::Memcache => {
            return Err(crate::error::SessionError::Config(
                "Memcache storage requires the `memcache` feature".to_owned(),
            ))
        }
        #[cfg(feature = "redis_fred")]
        StorageKind::Redis => {
            use fred::prelude::{Builder, ClientLike, Config};

            let pool = Builder::from_config(Config::from_url(&options.redis_url)?).build_pool(4)?;
            pool.init().await?;
            Arc::new(
                redis::RedisFredStorage::builder()
                    .pool(pool)
                    .prefix(options.redis_prefix.as_str())
                    .codec(codec)
                    .lifetime(options.lifetime)
                    .build(),
            )
        }
        #[cfg(not(feature = "redis_fred"))]
        StorageKind::Redis => {
            return Err(crate::error::SessionError::Config(
                "Redis storage requires the `redis_fred` feature".to_owned(),
            ))
        }
    };
    Ok(storage)
}
