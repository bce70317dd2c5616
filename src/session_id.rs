//! Session ID generation

use rand::{rngs::OsRng, TryRngCore};

use crate::error::{SessionError, SessionResult};

/// Symbols allowed in a generated session ID
pub const ALPHANUMERIC: &[u8; 62] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz1234567890";

/// Length of a generated session ID
pub const SESSION_ID_LENGTH: usize = 32;

const MAX_SESSION_ID_LENGTH: usize = 128;

/// Generate a new session ID: 32 bytes from the OS random source, each mapped
/// into the 62-character alphanumeric alphabet. IDs are not checked for collisions.
pub fn generate_session_id() -> SessionResult<String> {
    let mut bytes = [0u8; SESSION_ID_LENGTH];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SessionError::IdGeneration(Box::new(e)))?;

    Ok(bytes
        .iter()
        .map(|b| ALPHANUMERIC[(*b % 62) as usize] as char)
        .collect())
}

/// Whether the given ID is safe to use as a storage key (and as a file name).
/// Client-supplied IDs don't have to be generated by this crate, but they must
/// be non-empty ASCII alphanumeric strings of a reasonable length.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LENGTH
        && id.bytes().all(|b| b.is_ascii_alphanumeric())
}
