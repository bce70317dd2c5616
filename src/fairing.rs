use std::sync::Arc;

use bon::Builder;
use rocket::{fairing::Fairing, figment::Figment, Build, Orbit, Rocket};

use crate::{
    error::{SessionError, SessionResult},
    registry::SessionRegistry,
    service::SessionService,
    storage::{self, memory::MemoryStorage, SessionStorage},
    SessionOptions,
};

/**
A Rocket fairing that enables sessions.

On ignite, it sets up the storage, starts the periodic garbage collection and
registers a [`SessionService`] in Rocket's managed state. On shutdown, all live
sessions are flushed to storage.

# Example
```rust
use rocket_session_store::{RocketSessionStore, storage::filesystem::FilesystemStorage};

#[rocket::launch]
fn rocket() -> _ {
    // Use default settings with in-memory storage
    let session_fairing = RocketSessionStore::default();

    // Or customize settings with the builder
    let custom_session = RocketSessionStore::builder()
        .storage(FilesystemStorage::builder().folder("./var/session/").build())
        .with_options(|opt| {
            opt.cookie_name = "my_cookie".to_string();
            opt.lifetime = 7 * 24 * 60 * 60; // 7 days
            opt.update_time = 0; // flush every change
        })
        .build();

    rocket::build()
        .attach(session_fairing)
        // ... other configuration ...
}
```
*/
#[derive(Builder)]
pub struct RocketSessionStore {
    /// Set the options directly. Alternatively, use `with_options` to customize the default options via a closure.
    #[builder(default)]
    pub(crate) options: SessionOptions,
    #[builder(default = Arc::new(MemoryStorage), with = |storage: impl SessionStorage + 'static| Arc::new(storage))]
    /// Set the session storage provider. The default is an in-memory storage.
    pub(crate) storage: Arc<dyn SessionStorage>,
    /// Share a registry with other parts of the application. A new one is created by default.
    #[builder(default)]
    pub(crate) registry: Arc<SessionRegistry>,
}

impl Default for RocketSessionStore {
    /// Create a new instance with default options and an in-memory storage.
    fn default() -> Self {
        Self {
            options: Default::default(),
            storage: Arc::new(MemoryStorage),
            registry: Default::default(),
        }
    }
}

impl RocketSessionStore {
    /**
    Create the fairing from the `session` table of a Rocket configuration, with the
    storage backend selected by its `storage` key. Missing keys keep their defaults.

    ```toml
    [default.session]
    storage = "filesystem"
    storage_folder = "./var/session/"
    lifetime = 3600
    update_time = 10
    ```
    */
    pub async fn from_figment(figment: &Figment) -> SessionResult<Self> {
        let options: SessionOptions = if figment.contains("session") {
            figment
                .extract_inner("session")
                .map_err(|e| SessionError::Config(e.to_string()))?
        } else {
            SessionOptions::default()
        };
        let storage = storage::from_options(&options).await?;
        Ok(Self {
            options,
            storage,
            registry: Default::default(),
        })
    }
}

use rocket_session_store_builder::{IsUnset, SetOptions, State};
impl<S> RocketSessionStoreBuilder<S>
where
    S: State,
{
    /// Customize the [options](SessionOptions) via a closure. Any options that are not set will retain their default values.
    pub fn with_options<OptionsFn>(self, options_fn: OptionsFn) -> RocketSessionStoreBuilder<SetOptions<S>>
    where
        S::Options: IsUnset,
        OptionsFn: FnOnce(&mut SessionOptions),
    {
        let mut options = SessionOptions::default();
        options_fn(&mut options);
        self.options(options)
    }
}

#[rocket::async_trait]
impl Fairing for RocketSessionStore {
    fn info(&self) -> rocket::fairing::Info {
        use rocket::fairing::Kind;
        rocket::fairing::Info {
            name: "Rocket Session Store",
            kind: Kind::Ignite | Kind::Shutdown | Kind::Singleton,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> Result<Rocket<Build>, Rocket<Build>> {
        rocket::debug!("Setting up session resources...");
        let service = SessionService::new(
            self.registry.clone(),
            self.storage.clone(),
            self.options.clone(),
        );
        if let Err(e) = service.startup().await {
            rocket::warn!("Error during session storage setup: {}", e);
        }
        rocket::info!("Sessions are stored with {}", service.storage_name());

        Ok(rocket.manage(service))
    }

    async fn on_shutdown(&self, rocket: &Rocket<Orbit>) {
        rocket::debug!("Shutting down session resources...");
        let Some(service) = rocket.state::<SessionService>() else {
            return;
        };
        if let Err(e) = service.shutdown().await {
            rocket::warn!("Error during session storage shutdown: {e}");
        }
    }
}
