use serde::Deserialize;

/// Which storage backend keeps the durable copy of sessions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// One JSON file per session in [`SessionOptions::storage_folder`]
    #[default]
    Filesystem,
    /// Sessions only live in memory
    Memory,
    /// An in-process expiring key/value cache
    Cache,
    /// Memcached servers (requires the `memcache` feature)
    Memcache,
    /// Redis (requires the `redis_fred` feature)
    Redis,
}

/// Options for configuring the session store. Can be deserialized from a `session`
/// table in Rocket's configuration (see [`RocketSessionStore::from_figment`](crate::RocketSessionStore::from_figment)).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// The name of the cookie holding the session ID (default: `"OTTEMOSESSION"`)
    pub cookie_name: String,
    /// The request header checked for a session ID when there's no cookie (default: `"OTTEMOSESSION"`)
    pub header_name: String,
    /// The session cookie's `Domain` attribute (default: `None`)
    pub domain: Option<String>,
    /// The session cookie's `HttpOnly` attribute (default: `true`)
    pub http_only: bool,
    /// The session cookie's `Path` attribute (default: `"/"`)
    pub path: String,
    /// The session cookie's `SameSite` attribute (default: `SameSite::Lax`)
    #[serde(skip)]
    pub same_site: rocket::http::SameSite,
    /// The session cookie's `Secure` attribute (default: `false`)
    pub secure: bool,
    /// Seconds after the last update when a session is considered expired (default: 1 hour)
    pub lifetime: u64,
    /// Flush policy, in seconds (default: `10`).
    /// - `<= 0`: every change is flushed to storage immediately
    /// - `> 0`: changes stay in memory, and a periodic sweep with this interval flushes
    ///   sessions that haven't been updated for this long
    /// - `-1` together with [`keep_in_memory_items`](Self::keep_in_memory_items): bounded-memory mode
    pub update_time: i64,
    /// Maximum number of sessions kept in memory in bounded-memory mode (default: `0` = unbounded)
    pub keep_in_memory_items: usize,
    /// Encrypt session payloads before they're written to storage (default: `false`)
    pub crypt_session: bool,
    /// Passphrase for payload encryption. A built-in key is used if not set.
    pub crypt_key: Option<String>,
    /// The storage backend (default: filesystem)
    pub storage: StorageKind,
    /// Folder for the filesystem storage (default: `"./var/session/"`)
    pub storage_folder: String,
    /// Redis connection URL (default: `"redis://127.0.0.1:6379"`)
    pub redis_url: String,
    /// Prefix for Redis session keys (default: `"sess:"`)
    pub redis_prefix: String,
    /// Memcached servers, as `host:port` or `memcache://` URLs (default: `["127.0.0.1:11211"]`)
    pub memcache_servers: Vec<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cookie_name: "OTTEMOSESSION".to_owned(),
            header_name: "OTTEMOSESSION".to_owned(),
            domain: None,
            http_only: true,
            path: "/".to_owned(),
            same_site: rocket::http::SameSite::Lax,
            secure: false,
            lifetime: 60 * 60,
            update_time: 10,
            keep_in_memory_items: 0,
            crypt_session: false,
            crypt_key: None,
            storage: StorageKind::Filesystem,
            storage_folder: "./var/session/".to_owned(),
            redis_url: "redis://127.0.0.1:6379".to_owned(),
            redis_prefix: "sess:".to_owned(),
            memcache_servers: vec!["127.0.0.1:11211".to_owned()],
        }
    }
}

impl SessionOptions {
    /// Every change is flushed to storage right away
    pub(crate) fn is_eager(&self) -> bool {
        self.update_time <= 0
    }

    /// The in-memory count is capped at allocation time
    pub(crate) fn is_bounded(&self) -> bool {
        self.update_time == -1 && self.keep_in_memory_items > 0
    }

    /// Whether a session that was last updated `age_secs` seconds ago has expired
    pub(crate) fn is_expired(&self, age_secs: f64) -> bool {
        age_secs >= self.lifetime as f64
    }
}
