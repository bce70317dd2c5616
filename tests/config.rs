use rocket::{figment::Figment, local::asynchronous::Client};
use rocket_session_store::{
    error::SessionError, RocketSessionStore, SessionOptions, SessionService, StorageKind,
};
use test_case::test_case;

fn figment() -> Figment {
    rocket::Config::figment()
}

#[test]
fn test_default_options() {
    let options = SessionOptions::default();
    assert_eq!(options.cookie_name, "OTTEMOSESSION");
    assert_eq!(options.header_name, "OTTEMOSESSION");
    assert_eq!(options.path, "/");
    assert_eq!(options.lifetime, 3600);
    assert_eq!(options.update_time, 10);
    assert_eq!(options.keep_in_memory_items, 0);
    assert!(!options.crypt_session);
    assert_eq!(options.storage, StorageKind::Filesystem);
    assert_eq!(options.storage_folder, "./var/session/");
    assert_eq!(options.memcache_servers, vec!["127.0.0.1:11211".to_owned()]);
}

#[test_case("filesystem", StorageKind::Filesystem)]
#[test_case("memory", StorageKind::Memory)]
#[test_case("memcache", StorageKind::Memcache)]
#[test_case("cache", StorageKind::Cache)]
#[test_case("redis", StorageKind::Redis)]
fn test_storage_kind(value: &str, expected: StorageKind) {
    let options: SessionOptions = figment()
        .merge(("session.storage", value))
        .extract_inner("session")
        .expect("Should extract options");
    assert_eq!(options.storage, expected);
}

#[rocket::async_test]
async fn test_from_figment() {
    let folder = tempfile::tempdir().unwrap();
    let figment = figment()
        .merge(("session.storage", "filesystem"))
        .merge(("session.storage_folder", folder.path()))
        .merge(("session.lifetime", 120))
        .merge(("session.update_time", 0))
        .merge(("session.crypt_session", true));

    let fairing = RocketSessionStore::from_figment(&figment)
        .await
        .expect("Should build fairing");
    let client = Client::untracked(rocket::custom(figment).attach(fairing))
        .await
        .unwrap();

    let service = client.rocket().state::<SessionService>().unwrap();
    assert_eq!(service.storage_name(), "FilesystemSessionStorage");
    assert_eq!(service.options().lifetime, 120);
    assert_eq!(service.options().update_time, 0);
    assert_eq!(service.options().cookie_name, "OTTEMOSESSION", "Default is kept");

    let session = service.new_session().await.unwrap();
    session.set("cart_id", "abc123").await.unwrap();
    let raw = std::fs::read(folder.path().join(session.id())).expect("Session is stored");
    assert!(!String::from_utf8_lossy(&raw).contains("abc123"), "Payload is encrypted");
    assert_eq!(session.get_as::<String>("cart_id").await.as_deref(), Some("abc123"));
}

#[rocket::async_test]
async fn test_from_figment_without_session_table() {
    let fairing = RocketSessionStore::from_figment(&figment()).await;
    assert!(fairing.is_ok(), "Defaults are used");
}

#[rocket::async_test]
async fn test_invalid_config() {
    let figment = figment().merge(("session.lifetime", "forever"));
    let fairing = RocketSessionStore::from_figment(&figment).await;
    assert!(matches!(fairing, Err(SessionError::Config(_))));
}

#[cfg(not(feature = "redis_fred"))]
#[rocket::async_test]
async fn test_redis_requires_feature() {
    let figment = figment().merge(("session.storage", "redis"));
    let fairing = RocketSessionStore::from_figment(&figment).await;
    assert!(matches!(fairing, Err(SessionError::Config(_))));
}

#[cfg(not(feature = "memcache"))]
#[rocket::async_test]
async fn test_memcache_requires_feature() {
    let figment = figment().merge(("session.storage", "memcache"));
    let fairing = RocketSessionStore::from_figment(&figment).await;
    assert!(matches!(fairing, Err(SessionError::Config(_))));
}

#[rocket::async_test]
async fn test_cache_storage_from_figment() {
    let figment = figment()
        .merge(("session.storage", "cache"))
        .merge(("session.memcache_servers", ["10.0.0.1:11211", "10.0.0.2:11211"]));
    let options: SessionOptions = figment.extract_inner("session").unwrap();
    assert_eq!(options.memcache_servers.len(), 2);

    let fairing = RocketSessionStore::from_figment(&figment)
        .await
        .expect("Should build fairing");
    let client = Client::untracked(rocket::custom(figment).attach(fairing))
        .await
        .unwrap();
    let service = client.rocket().state::<SessionService>().unwrap();
    assert_eq!(service.storage_name(), "CacheSessionStorage");
}
