//! Shared interface for session storage

use rocket::async_trait;

use crate::error::SessionResult;

use super::SessionRecord;

/// Trait representing a session backend storage. You can use your own session storage
/// by implementing this trait.
///
/// The [`SessionService`](crate::SessionService) resolves the in-memory copy of a session
/// before calling [`save`](Self::save), skips empty sessions, and evicts the in-memory
/// copy after a successful save unless [`retains_in_memory`](Self::retains_in_memory)
/// returns `true`.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Name of the storage implementation, for diagnostics
    fn name(&self) -> &'static str;

    /// Load a session record from storage. If there's no stored copy, or it has
    /// expired by the storage's own TTL mechanism, a [`SessionError::NotFound`](crate::error::SessionError::NotFound)
    /// or [`SessionError::Expired`](crate::error::SessionError::Expired) should be returned instead.
    async fn load(&self, id: &str) -> SessionResult<SessionRecord>;

    /// Save or update a session record in storage.
    async fn save(&self, record: &SessionRecord) -> SessionResult<()>;

    /// Delete a session from storage. Deleting a session that isn't stored is not an error.
    async fn delete(&self, id: &str) -> SessionResult<()>;

    /// Whether the in-memory copy of a session should be kept after it was saved
    fn retains_in_memory(&self) -> bool {
        false // Default: a flush also releases memory
    }

    /// Optional setup of resources that will be called on server startup
    async fn setup(&self) -> SessionResult<()> {
        Ok(()) // Default no-op
    }

    /// Optional teardown of resources that will be called on server shutdown
    async fn shutdown(&self) -> SessionResult<()> {
        Ok(()) // Default no-op
    }
}
