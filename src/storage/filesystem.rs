//! Filesystem session storage

use std::{
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};

use bon::Builder;
use rocket::{async_trait, tokio::fs, tokio::task::spawn_blocking};
use time::OffsetDateTime;

use crate::{
    error::{SessionError, SessionResult},
    session_id::is_valid_session_id,
};

use super::{interface::SessionStorage, RecordCodec, SessionRecord};

/**
Filesystem storage provider. Each session is stored as a JSON file (optionally
encrypted) named after the session ID, inside the storage folder.

The file modification time doubles as the expiry clock: it's set to the session's
update time on every save, and a file older than the session lifetime is deleted
instead of being loaded.

```rust
use rocket_session_store::storage::{filesystem::FilesystemStorage, RecordCodec};

let storage = FilesystemStorage::builder()
    .folder("./var/session/")
    .codec(RecordCodec::plain())
    .lifetime(60 * 60)
    .build();
```
*/
#[derive(Builder, Debug)]
pub struct FilesystemStorage {
    /// Folder holding the session files
    #[builder(into)]
    folder: PathBuf,
    /// Encoding (and optional encryption) of session files
    #[builder(default)]
    codec: RecordCodec,
    /// Seconds after the last update when a stored session is considered expired (default: 1 hour)
    #[builder(default = 60 * 60)]
    lifetime: u64,
}

impl FilesystemStorage {
    pub fn folder(&self) -> &PathBuf {
        &self.folder
    }

    /// Path of the session file. The ID is used as the file name, so it must
    /// not be able to escape the storage folder.
    pub fn session_path(&self, id: &str) -> SessionResult<PathBuf> {
        if !is_valid_session_id(id) {
            return Err(SessionError::InvalidId);
        }
        Ok(self.folder.join(id))
    }

    fn is_expired(&self, modified: SystemTime) -> bool {
        let age = OffsetDateTime::now_utc() - OffsetDateTime::from(modified);
        age.as_seconds_f64() >= self.lifetime as f64
    }

    /// Remove expired session files. Returns the number of files removed.
    async fn remove_expired_files(&self) -> SessionResult<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.folder).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if is_temp_file(file_name) {
                // left over from an interrupted save
                if let Err(e) = fs::remove_file(entry.path()).await {
                    rocket::warn!("Couldn't remove temporary session file {:?}: {e}", entry.path());
                }
                continue;
            }
            if !is_valid_session_id(file_name) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() || !self.is_expired(metadata.modified()?) {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => rocket::warn!("Couldn't remove expired session file {:?}: {e}", entry.path()),
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl SessionStorage for FilesystemStorage {
    fn name(&self) -> &'static str {
        "FilesystemSessionStorage"
    }

    async fn load(&self, id: &str) -> SessionResult<SessionRecord> {
        let path = self.session_path(id)?;
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(SessionError::NotFound),
            Err(e) => return Err(e.into()),
        };

        let modified = metadata.modified()?;
        if self.is_expired(modified) {
            match fs::remove_file(&path).await {
                Ok(()) => (),
                Err(e) if e.kind() == ErrorKind::NotFound => (),
                Err(e) => return Err(e.into()),
            }
            return Err(SessionError::Expired);
        }

        let payload = match fs::read(&path).await {
            Ok(payload) => payload,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(SessionError::NotFound),
            Err(e) => return Err(e.into()),
        };
        let decoded = self.codec.decode(id, &payload)?;
        Ok(decoded.or_updated_at(modified.into()))
    }

    async fn save(&self, record: &SessionRecord) -> SessionResult<()> {
        let path = self.session_path(&record.id)?;
        let payload = self.codec.encode(record)?;
        let modified: SystemTime = record.updated_at.into();

        // readers only ever see complete payloads
        let tmp_path = self.folder.join(format!(".{}.tmp", record.id));
        spawn_blocking(move || {
            let written = write_session_file(&tmp_path, &path, &payload, modified);
            if written.is_err() {
                let _ = std::fs::remove_file(&tmp_path);
            }
            written
        })
        .await
        .map_err(|e| SessionError::Backend(Box::new(e)))??;

        Ok(())
    }

    async fn delete(&self, id: &str) -> SessionResult<()> {
        let path = self.session_path(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn setup(&self) -> SessionResult<()> {
        fs::create_dir_all(&self.folder).await?;
        let removed = self.remove_expired_files().await?;
        rocket::debug!("Removed {removed} expired session file(s) from {:?}", self.folder);
        Ok(())
    }
}

fn write_session_file(
    tmp_path: &Path,
    path: &Path,
    payload: &[u8],
    modified: SystemTime,
) -> std::io::Result<()> {
    let mut file = std::fs::File::create(tmp_path)?;
    file.write_all(payload)?;
    // the file's mtime tracks the session's update time, not the write time
    file.set_modified(modified)?;
    drop(file);
    std::fs::rename(tmp_path, path)
}

/// Temporary files are named `.<id>.tmp`
fn is_temp_file(file_name: &str) -> bool {
    file_name
        .strip_prefix('.')
        .and_then(|name| name.strip_suffix(".tmp"))
        .is_some_and(is_valid_session_id)
}
