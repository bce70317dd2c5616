//! Serialized form of a session, shared by the storage backends

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    container::SessionData,
    crypt::PayloadCipher,
    error::SessionResult,
    options::SessionOptions,
};

/// Durable counterpart of an in-memory session
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub data: SessionData,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl SessionRecord {
    /// Seconds since the session was last updated
    pub fn age_secs(&self) -> f64 {
        (OffsetDateTime::now_utc() - self.updated_at).as_seconds_f64()
    }

    /// Time left before the session expires, counted from its update time.
    /// `None` if it already has.
    pub fn remaining_lifetime(&self, lifetime: u64) -> Option<std::time::Duration> {
        let remaining = time::Duration::seconds(lifetime as i64)
            - (OffsetDateTime::now_utc() - self.updated_at);
        std::time::Duration::try_from(remaining)
            .ok()
            .filter(|ttl| !ttl.is_zero())
    }
}

/// Lenient shape used for reading: partially written or legacy payloads may
/// have a `null`/missing data map or update time.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    #[serde(default)]
    data: Option<SessionData>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    updated_at: Option<OffsetDateTime>,
}

/// A record read from storage, whose update time may still be unknown
#[derive(Debug)]
pub struct DecodedRecord {
    pub id: String,
    pub data: SessionData,
    pub updated_at: Option<OffsetDateTime>,
}

impl DecodedRecord {
    /// Complete the record, substituting the backend's own time if the update time was missing
    pub fn or_updated_at(self, fallback: OffsetDateTime) -> SessionRecord {
        SessionRecord {
            id: self.id,
            data: self.data,
            updated_at: self.updated_at.unwrap_or(fallback),
        }
    }
}

/// JSON encoding of session records, optionally encrypted
#[derive(Clone, Debug, Default)]
pub struct RecordCodec {
    cipher: Option<PayloadCipher>,
}

impl RecordCodec {
    pub fn plain() -> Self {
        Self { cipher: None }
    }

    pub fn encrypted(cipher: PayloadCipher) -> Self {
        Self {
            cipher: Some(cipher),
        }
    }

    pub fn from_options(options: &SessionOptions) -> Self {
        if options.crypt_session {
            Self::encrypted(PayloadCipher::new(options.crypt_key.as_deref()))
        } else {
            Self::plain()
        }
    }

    pub fn encode(&self, record: &SessionRecord) -> SessionResult<Vec<u8>> {
        let mut json = serde_json::to_vec(record)?;
        json.push(b'\n');
        match &self.cipher {
            Some(cipher) => cipher.encrypt(&json),
            None => Ok(json),
        }
    }

    /// Decode a stored payload for the session `id`. The ID is taken from the storage
    /// key rather than the payload.
    pub fn decode(&self, id: &str, payload: &[u8]) -> SessionResult<DecodedRecord> {
        let stored: StoredRecord = match &self.cipher {
            Some(cipher) => serde_json::from_slice(&cipher.decrypt(payload)?)?,
            None => serde_json::from_slice(payload)?,
        };

        Ok(DecodedRecord {
            id: id.to_owned(),
            data: stored.data.unwrap_or_default(),
            // zero timestamps from legacy writers count as missing
            updated_at: stored.updated_at.filter(|t| t.year() > 1),
        })
    }
}
