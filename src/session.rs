use std::fmt::Display;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{error::SessionResult, service::SessionService};

/**
Handle to a session. The handle only holds the session ID: every call is routed
through the owning [`SessionService`], which may evict and reload the underlying
record between calls.

When used as a request guard, it resolves the session from the session cookie
(or header), creating a new session if needed. The guard only fails on a
storage error.

# Example
```rust
use rocket_session_store::Session;

#[rocket::post("/cart/<cart_id>")]
async fn set_cart(session: Session, cart_id: &str) -> String {
    session.set("cart_id", cart_id).await.ok();
    format!("Session {} uses cart {cart_id}", session.id())
}

#[rocket::get("/cart")]
async fn get_cart(session: Session) -> Option<String> {
    session.get_as::<String>("cart_id").await
}
```
*/
#[derive(Clone, Debug)]
pub struct Session {
    id: String,
    service: SessionService,
}

impl Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Session(id: {:?})", self.id)
    }
}

impl Session {
    pub(crate) fn new(id: &str, service: SessionService) -> Self {
        Self {
            id: id.to_owned(),
            service,
        }
    }

    /// Get the session ID (alphanumeric string)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the value of a key in the session data via cloning
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.service.get_key(&self.id, key).await
    }

    /// Get the value of a key, deserialized into `T`. `None` if the key isn't set
    /// or holds a value of another shape.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .await
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Set the value of a key in the session data. Will re-create the session if
    /// it was closed or expired in the meantime.
    pub async fn set(&self, key: &str, value: impl Into<Value>) -> SessionResult<()> {
        self.service.set_key(&self.id, key, value.into()).await
    }

    /// Update the value of a key via a closure, atomically with respect to other
    /// changes of this session. Returns the new value.
    pub async fn update<F>(&self, key: &str, f: F) -> SessionResult<Value>
    where
        F: FnOnce(Option<Value>) -> Value + Send,
    {
        self.service.update_key(&self.id, key, f).await
    }

    /// Remove a key from the session data, returning its previous value
    pub async fn remove(&self, key: &str) -> SessionResult<Option<Value>> {
        self.service.remove_key(&self.id, key).await
    }

    /// Whether the session is gone or holds no data
    pub async fn is_empty(&self) -> bool {
        self.service.is_empty(&self.id).await
    }

    /// Refresh the session's update time
    pub async fn touch(&self) -> SessionResult<()> {
        self.service.touch(&self.id).await
    }

    /// Close the session, removing it from memory and from storage
    pub async fn close(&self) -> SessionResult<()> {
        self.service.close(&self.id).await
    }
}
