//! Memory-only session storage

use rocket::async_trait;

use crate::error::{SessionError, SessionResult};

use super::{interface::SessionStorage, SessionRecord};

/// Storage provider that never persists anything: sessions only live in the
/// [`SessionRegistry`](crate::SessionRegistry), are never evicted by a flush, and
/// are lost on restart. Useful for development and tests.
#[derive(Debug, Default)]
pub struct MemoryStorage;

#[async_trait]
impl SessionStorage for MemoryStorage {
    fn name(&self) -> &'static str {
        "MemorySessionStorage"
    }

    async fn load(&self, _id: &str) -> SessionResult<SessionRecord> {
        Err(SessionError::NotFound)
    }

    async fn save(&self, _record: &SessionRecord) -> SessionResult<()> {
        Ok(())
    }

    async fn delete(&self, _id: &str) -> SessionResult<()> {
        Ok(())
    }

    fn retains_in_memory(&self) -> bool {
        true
    }
}
