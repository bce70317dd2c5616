//! Error types

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can happen during session retrieval/handling
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// An empty session ID was passed to the session service
    #[error("Blank session id")]
    BlankId,
    /// The session ID contains characters outside of the alphanumeric alphabet
    #[error("Invalid session id")]
    InvalidId,
    /// Session wasn't found in memory or in storage
    #[error("Session not found")]
    NotFound,
    /// Session was found in storage but it was expired
    #[error("Session expired")]
    Expired,
    /// The system's random source couldn't produce a session ID
    #[error("Can't generate session id: {0}")]
    IdGeneration(Box<dyn std::error::Error + Send + Sync>),
    /// Error serializing or deserializing the session data
    #[error("Failed to serialize/deserialize session: {0}")]
    Serialization(Box<dyn std::error::Error + Send + Sync>),
    /// Encryption or decryption of a stored session payload failed
    #[error("Session payload crypt error: {0}")]
    Crypto(String),
    /// Invalid session configuration
    #[error("Invalid session configuration: {0}")]
    Config(String),
    /// A filesystem error from the storage backend
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A generic error from the storage backend. This error type can be
    /// used when implementing a custom session storage.
    #[error("Storage backend error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),

    #[cfg(feature = "redis_fred")]
    #[error("fred.rs client error: {0}")]
    RedisFredError(#[from] fred::error::Error),

    #[cfg(feature = "memcache")]
    #[error("memcache client error: {0}")]
    MemcacheError(#[from] memcache::MemcacheError),
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Serialization(Box::new(e))
    }
}
