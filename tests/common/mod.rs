#![allow(dead_code)]

use std::{path::Path, sync::Arc};

use rocket_session_store::{
    storage::{filesystem::FilesystemStorage, RecordCodec, SessionStorage},
    SessionContainer, SessionData, SessionOptions, SessionRegistry, SessionService,
};
use serde_json::Value;
use time::{Duration, OffsetDateTime};

pub const LIFETIME: u64 = 60;

/// Options with the given flush policy and a one minute lifetime
pub fn options(update_time: i64) -> SessionOptions {
    SessionOptions {
        lifetime: LIFETIME,
        update_time,
        ..Default::default()
    }
}

pub fn service(storage: Arc<dyn SessionStorage>, options: SessionOptions) -> SessionService {
    SessionService::new(Arc::new(SessionRegistry::new()), storage, options)
}

pub fn filesystem_storage(folder: &Path) -> Arc<FilesystemStorage> {
    Arc::new(
        FilesystemStorage::builder()
            .folder(folder)
            .codec(RecordCodec::plain())
            .lifetime(LIFETIME)
            .build(),
    )
}

/// Session data from `(key, value)` pairs
pub fn data<const N: usize>(entries: [(&str, Value); N]) -> SessionData {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
}

/// A session record last updated `age_secs` seconds ago
pub fn aged_container(id: &str, data: SessionData, age_secs: i64) -> Arc<SessionContainer> {
    Arc::new(SessionContainer::with_data(
        id,
        data,
        OffsetDateTime::now_utc() - Duration::seconds(age_secs),
    ))
}

/// Names of all files in a folder
pub fn stored_files(folder: &Path) -> Vec<String> {
    std::fs::read_dir(folder)
        .expect("Should read storage folder")
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[cfg(feature = "redis_fred")]
pub async fn setup_redis_fred() -> (fred::prelude::Pool, String) {
    use fred::prelude::{ClientLike, ReconnectPolicy};

    let pool = fred::prelude::Builder::default_centralized()
        .set_policy(ReconnectPolicy::new_linear(3, 5, 1))
        .with_performance_config(|c| c.default_command_timeout = std::time::Duration::from_secs(5))
        .build_pool(3)
        .expect("Should build Redis pool");
    pool.init().await.expect("Should initialize Redis pool");
    let prefix = format!("test{}sess", random_string(6));

    (pool, prefix)
}

#[cfg(feature = "redis_fred")]
pub async fn teardown_redis_fred(pool: fred::prelude::Pool, prefix: String) {
    use fred::prelude::{ClientLike, KeysInterface};

    let (_cursor, keys): (String, Vec<String>) = pool
        .scan_page("0", format!("{prefix}*"), Some(50), None)
        .await
        .expect("Should scan keys");
    if !keys.is_empty() {
        let _: () = pool.del(keys).await.expect("Should delete keys");
    }
    pool.quit().await.expect("Should quit Redis pool");
}

#[cfg(feature = "redis_fred")]
fn random_string(n: usize) -> String {
    (0..n)
        .map(|_| (b'a' + (rand::random::<u8>() % 26)) as char)
        .collect()
}
