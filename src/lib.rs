#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

/*!
# Overview
Server-side session store for Rocket applications.

- Sessions are identified by a random alphanumeric ID, carried in a cookie or
  (as a fallback) a request header.
- Session data is a free-form key/value map of JSON values, kept in memory by a
  [`SessionRegistry`] and written to a durable storage backend by the
  [`SessionService`].
- The flush policy is configurable: write every change immediately, flush idle
  sessions periodically, or keep a bounded number of sessions in memory.
- Stored payloads can optionally be encrypted (AES-256-GCM).
- Multiple storage providers available, or you can use your own session storage
  by implementing the [`SessionStorage`](crate::storage::SessionStorage) trait.

# Usage

## Basic setup

```rust
use rocket::routes;
use rocket_session_store::{Session, RocketSessionStore};

#[rocket::launch]
fn rocket() -> _ {
    rocket::build()
        // attach the `RocketSessionStore` fairing
        .attach(RocketSessionStore::default())
        .mount("/", routes![login])
}

// use the `Session` request guard in a route handler
#[rocket::post("/login")]
async fn login(session: Session) {
    session.set("user_id", "123").await.ok();
}
```

## Configuration

The fairing can also be built from the `session` table of Rocket's configuration,
which selects the storage backend as well (see [`SessionOptions`] for all keys):

```rust,no_run
use rocket_session_store::RocketSessionStore;

#[rocket::launch]
async fn rocket() -> _ {
    let rocket = rocket::build();
    let sessions = RocketSessionStore::from_figment(rocket.figment())
        .await
        .expect("valid session configuration");
    rocket.attach(sessions)
}
```

## Request guard auth

The [Session] request guard resolves the session from the cookie or header, and
creates a new one when none is found. It only fails if the storage backend fails.
An authentication layer can be written on top of it with Rocket's request guards:

```
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request,
};
use rocket_session_store::Session;

struct User {
    user_id: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
   type Error = &'r str;

   async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
       let Outcome::Success(session) = req.guard::<Session>().await else {
           return Outcome::Error((Status::InternalServerError, "Session unavailable"));
       };
       match session.get_as::<String>("user_id").await {
           Some(user_id) => Outcome::Success(User { user_id }),
           None => Outcome::Error((Status::Unauthorized, "Not logged in")),
       }
    }
 }

 #[rocket::get("/user")]
 fn get_user(user: User) -> String {
    format!("Logged in as user {}!", user.user_id)
 }
```

# Storage Providers

| Storage | Feature Flag | Use Case |
|---------|-------------|----------|
| [`storage::memory::MemoryStorage`] | Built-in | Development, testing |
| [`storage::filesystem::FilesystemStorage`] | Built-in | Single server deployments |
| [`storage::cache::CacheStorage`] | Built-in | Single process, sessions survive eviction but not restarts |
| `storage::memcached::MemcacheStorage` | `memcache` | Shared cache across servers |
| `storage::redis::RedisFredStorage` | `redis_fred` | Production, distributed systems |

## Custom Storage

To implement a custom storage provider, implement the [`SessionStorage`](crate::storage::SessionStorage) trait:

```rust
use rocket_session_store::{error::SessionResult, storage::{SessionRecord, SessionStorage}};
use rocket::async_trait;

pub struct MyCustomStorage {}

#[async_trait]
impl SessionStorage for MyCustomStorage {
    fn name(&self) -> &'static str {
        "MyCustomStorage"
    }

    async fn load(&self, id: &str) -> SessionResult<SessionRecord> {
        // Load session from your storage
        todo!()
    }

    async fn save(&self, record: &SessionRecord) -> SessionResult<()> {
        // Save session to your storage
        todo!()
    }

    async fn delete(&self, id: &str) -> SessionResult<()> {
        // Delete session from your storage
        todo!()
    }
}
```

### Implementation Tips

1. **Thread Safety**: All storage implementations must be `Send + Sync`
2. **Missing sessions**: Return [`error::SessionError::NotFound`] (or `Expired`) from `load`
3. **Error Handling**: Use [`error::SessionError::Backend`] for custom errors
4. **Encoding**: [`storage::RecordCodec`] handles the stored JSON format and optional encryption
5. **Cleanup**: Implement proper cleanup in `shutdown()` if needed

# Feature flags

| Name    | Description    |
|---------|----------------|
| `redis_fred`  | A session store for Redis (and Redis-compatible databases), using the [fred.rs](https://docs.rs/crate/fred) crate. |
| `memcache`  | A session store for Memcached servers, using the [memcache](https://docs.rs/crate/memcache) crate. |
| `rocket_okapi`  | Enables support for the [rocket_okapi](https://docs.rs/crate/rocket_okapi) crate if needed. |
*/

mod container;
mod fairing;
mod guard;
mod id_lock;
mod options;
mod registry;
mod service;
mod session;

pub mod crypt;
pub mod error;
pub mod session_id;
pub mod storage;
pub use container::{SessionContainer, SessionData};
pub use fairing::{RocketSessionStore, RocketSessionStoreBuilder};
pub use options::{SessionOptions, StorageKind};
pub use registry::SessionRegistry;
pub use service::{Lookup, SessionService};
pub use session::Session;
