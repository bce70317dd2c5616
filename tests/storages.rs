mod common;

use std::{sync::Arc, time::SystemTime};

use rocket_session_store::{
    crypt::PayloadCipher,
    error::SessionError,
    storage::{
        cache::CacheStorage, filesystem::FilesystemStorage, RecordCodec, SessionRecord,
        SessionStorage,
    },
};
use serde_json::json;
use test_case::test_case;
use time::{Duration, OffsetDateTime};

use crate::common::{data, stored_files, LIFETIME};

fn record(id: &str, age_secs: i64) -> SessionRecord {
    SessionRecord {
        id: id.to_owned(),
        data: data([("cart_id", json!("abc123")), ("items", json!([1, 2, 3]))]),
        updated_at: OffsetDateTime::now_utc() - Duration::seconds(age_secs),
    }
}

fn filesystem(folder: &std::path::Path, codec: RecordCodec) -> FilesystemStorage {
    FilesystemStorage::builder()
        .folder(folder)
        .codec(codec)
        .lifetime(LIFETIME)
        .build()
}

fn create_storage(storage_case: &str, folder: &std::path::Path) -> Arc<dyn SessionStorage> {
    match storage_case {
        "filesystem" => Arc::new(filesystem(folder, RecordCodec::plain())),
        "filesystem_encrypted" => Arc::new(filesystem(
            folder,
            RecordCodec::encrypted(PayloadCipher::new(Some("secret"))),
        )),
        "cache" => Arc::new(CacheStorage::new(RecordCodec::plain(), LIFETIME)),
        "cache_encrypted" => Arc::new(CacheStorage::new(
            RecordCodec::encrypted(PayloadCipher::new(None)),
            LIFETIME,
        )),
        _ => unimplemented!(),
    }
}

#[test_case("filesystem"; "Filesystem")]
#[test_case("filesystem_encrypted"; "Encrypted filesystem")]
#[test_case("cache"; "Cache")]
#[test_case("cache_encrypted"; "Encrypted cache")]
#[rocket::async_test]
async fn test_storages(storage_case: &str) {
    let folder = tempfile::tempdir().unwrap();
    let storage = create_storage(storage_case, folder.path());
    storage.setup().await.expect("Should set up storage");

    let missing = storage.load("missing").await;
    assert!(matches!(missing, Err(SessionError::NotFound)), "Unknown session");

    let saved = record("abc123", 5);
    storage.save(&saved).await.expect("Should save session");

    let loaded = storage.load("abc123").await.expect("Should load session");
    assert_eq!(loaded.id, saved.id);
    assert_eq!(loaded.data, saved.data);
    assert_eq!(loaded.updated_at, saved.updated_at, "Update time is preserved");

    storage.delete("abc123").await.expect("Should delete session");
    let deleted = storage.load("abc123").await;
    assert!(matches!(deleted, Err(SessionError::NotFound)), "Session is deleted");
    storage
        .delete("abc123")
        .await
        .expect("Deleting a missing session is fine");

    storage.shutdown().await.expect("Should shut down storage");
}

#[rocket::async_test]
async fn test_filesystem_modified_time() {
    let folder = tempfile::tempdir().unwrap();
    let storage = filesystem(folder.path(), RecordCodec::plain());

    let saved = record("abc123", 30);
    storage.save(&saved).await.unwrap();

    let modified = std::fs::metadata(folder.path().join("abc123"))
        .unwrap()
        .modified()
        .unwrap();
    let expected: SystemTime = saved.updated_at.into();
    let drift = expected
        .duration_since(modified)
        .unwrap_or_else(|e| e.duration());
    assert!(drift.as_secs() < 1, "File time tracks the session update time");
}

#[rocket::async_test]
async fn test_filesystem_expired_file() {
    let folder = tempfile::tempdir().unwrap();
    let storage = filesystem(folder.path(), RecordCodec::plain());

    storage.save(&record("expired", LIFETIME as i64 * 2)).await.unwrap();
    let expired = storage.load("expired").await;
    assert!(matches!(expired, Err(SessionError::Expired)));
    assert!(stored_files(folder.path()).is_empty(), "Expired file is removed");
}

#[rocket::async_test]
async fn test_filesystem_setup_removes_expired_files() {
    let folder = tempfile::tempdir().unwrap();
    let storage = filesystem(folder.path(), RecordCodec::plain());

    storage.save(&record("expired", LIFETIME as i64 * 2)).await.unwrap();
    storage.save(&record("fresh", 5)).await.unwrap();
    std::fs::write(folder.path().join("notes.txt"), "not a session").unwrap();

    storage.setup().await.expect("Should set up storage");

    let mut files = stored_files(folder.path());
    files.sort();
    assert_eq!(files, vec!["fresh".to_owned(), "notes.txt".to_owned()]);
}

#[rocket::async_test]
async fn test_filesystem_setup_creates_folder() {
    let folder = tempfile::tempdir().unwrap();
    let nested = folder.path().join("var").join("session");
    let storage = filesystem(&nested, RecordCodec::plain());

    storage.setup().await.expect("Should set up storage");
    assert!(nested.is_dir());
}

#[rocket::async_test]
async fn test_filesystem_invalid_id() {
    let folder = tempfile::tempdir().unwrap();
    let storage = filesystem(folder.path(), RecordCodec::plain());

    let load = storage.load("../outside").await;
    assert!(matches!(load, Err(SessionError::InvalidId)));
    let save = storage.save(&record("../outside", 0)).await;
    assert!(matches!(save, Err(SessionError::InvalidId)));
    let delete = storage.delete("a/b").await;
    assert!(matches!(delete, Err(SessionError::InvalidId)));
}

#[rocket::async_test]
async fn test_filesystem_legacy_payload() {
    let folder = tempfile::tempdir().unwrap();
    let storage = filesystem(folder.path(), RecordCodec::plain());

    std::fs::write(
        folder.path().join("legacy"),
        r#"{"id":"legacy","data":null,"updatedAt":"0001-01-01T00:00:00Z"}"#,
    )
    .unwrap();

    let loaded = storage.load("legacy").await.expect("Should load legacy session");
    assert!(loaded.data.is_empty(), "Null data is an empty map");
    let age = OffsetDateTime::now_utc() - loaded.updated_at;
    assert!(age < Duration::seconds(5), "Missing update time falls back to the file time");
}

#[rocket::async_test]
async fn test_filesystem_corrupt_payload() {
    let folder = tempfile::tempdir().unwrap();
    let storage = filesystem(folder.path(), RecordCodec::plain());

    std::fs::write(folder.path().join("corrupt"), "{not json").unwrap();
    let loaded = storage.load("corrupt").await;
    assert!(matches!(loaded, Err(SessionError::Serialization(_))));
}

#[rocket::async_test]
async fn test_filesystem_encrypted_payload() {
    let folder = tempfile::tempdir().unwrap();
    let storage = filesystem(
        folder.path(),
        RecordCodec::encrypted(PayloadCipher::new(Some("secret"))),
    );
    storage.save(&record("abc123", 0)).await.unwrap();

    let raw = std::fs::read(folder.path().join("abc123")).unwrap();
    assert!(
        !String::from_utf8_lossy(&raw).contains("cart_id"),
        "Payload is encrypted"
    );

    let other_key = filesystem(
        folder.path(),
        RecordCodec::encrypted(PayloadCipher::new(Some("other"))),
    );
    let loaded = other_key.load("abc123").await;
    assert!(matches!(loaded, Err(SessionError::Crypto(_))), "Wrong key fails");

    let plain = filesystem(folder.path(), RecordCodec::plain());
    let loaded = plain.load("abc123").await;
    assert!(matches!(loaded, Err(SessionError::Serialization(_))));
}

#[rocket::async_test]
async fn test_cache_expiry() {
    let storage = CacheStorage::new(RecordCodec::plain(), 1);
    storage.save(&record("abc123", 0)).await.unwrap();
    assert!(storage.load("abc123").await.is_ok());

    rocket::tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    let expired = storage.load("abc123").await;
    assert!(
        matches!(expired, Err(SessionError::NotFound | SessionError::Expired)),
        "Cache entry is expired"
    );
}

#[rocket::async_test]
async fn test_cache_ttl_counts_from_update_time() {
    let storage = CacheStorage::new(RecordCodec::plain(), 2);

    storage.save(&record("expired", 2)).await.unwrap();
    let expired = storage.load("expired").await;
    assert!(matches!(expired, Err(SessionError::NotFound)), "Expired session isn't saved");

    storage.save(&record("aging", 1)).await.unwrap();
    assert!(storage.load("aging").await.is_ok());
    rocket::tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    let expired = storage.load("aging").await;
    assert!(
        matches!(expired, Err(SessionError::NotFound | SessionError::Expired)),
        "Entry expires a lifetime after the update time"
    );
}

#[rocket::async_test]
async fn test_filesystem_failed_save_leaves_no_temp_file() {
    let folder = tempfile::tempdir().unwrap();
    let storage = filesystem(folder.path(), RecordCodec::plain());
    // a directory in the way of the session file makes the final rename fail
    std::fs::create_dir(folder.path().join("blocked")).unwrap();

    let saved = storage.save(&record("blocked", 0)).await;
    assert!(matches!(saved, Err(SessionError::Io(_))));
    assert_eq!(stored_files(folder.path()), vec!["blocked".to_owned()]);
}

#[rocket::async_test]
async fn test_filesystem_setup_removes_temp_files() {
    let folder = tempfile::tempdir().unwrap();
    let storage = filesystem(folder.path(), RecordCodec::plain());

    storage.save(&record("fresh", 5)).await.unwrap();
    std::fs::write(folder.path().join(".fresh.tmp"), "{\"data\":").unwrap();
    std::fs::write(folder.path().join(".hidden"), "not a session").unwrap();

    storage.setup().await.expect("Should set up storage");

    let mut files = stored_files(folder.path());
    files.sort();
    assert_eq!(files, vec![".hidden".to_owned(), "fresh".to_owned()]);
}

#[rocket::async_test]
async fn test_filesystem_concurrent_loads_of_expired_file() {
    let folder = tempfile::tempdir().unwrap();
    let storage = Arc::new(filesystem(folder.path(), RecordCodec::plain()));
    storage.save(&record("expired", LIFETIME as i64 * 2)).await.unwrap();

    let mut tasks = rocket::tokio::task::JoinSet::new();
    for _ in 0..8 {
        let storage = storage.clone();
        tasks.spawn(async move { storage.load("expired").await });
    }
    while let Some(result) = tasks.join_next().await {
        let loaded = result.unwrap();
        assert!(
            matches!(loaded, Err(SessionError::Expired | SessionError::NotFound)),
            "Losing the race to remove the file isn't an I/O error: {loaded:?}"
        );
    }
    assert!(stored_files(folder.path()).is_empty());
}
