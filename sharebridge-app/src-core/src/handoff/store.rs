//! Key-value storage shared by the host and extension processes.
//!
//! The two processes cannot share a lock, so the handoff slot relies on
//! read-once semantics: `take` removes the value as part of reading it, and
//! the file-backed store claims the value with an atomic rename first so that
//! two concurrent readers can never both see it.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use super::record::HandoffRecord;
use crate::error::{Result, ShareBridgeError};

pub trait SharedStore: Send + Sync {
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Read and delete in one step.
    fn take(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.get(key)?;
        if value.is_some() {
            self.remove(key)?;
        }
        Ok(value)
    }
}

/// Temp and claim files older than this were left by a process that died
/// mid-write or mid-read.
const STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Store backed by one JSON file per key in a directory both processes can reach.
#[derive(Debug, Clone)]
pub struct FileSharedStore {
    dir: PathBuf,
}

impl FileSharedStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            && !key.starts_with('.');
        if !valid {
            return Err(ShareBridgeError::Storage(format!("Invalid store key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    /// Delete temp and claim files for `key` not modified within `older_than`.
    /// Returns how many were removed.
    pub fn remove_stale(&self, key: &str, older_than: Duration) -> Result<usize> {
        self.path_for(key)?;
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let prefix = format!("{}.", key);
        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !is_leftover(name, &prefix) {
                continue;
            }
            // Gone already, or owned by a concurrent put or take.
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            if modified.elapsed().unwrap_or_default() < older_than {
                continue;
            }

            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("Removed stale store file {}", name);
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

/// `<key>.<uuid>.tmp` or `<key>.<uuid>.claim`.
fn is_leftover(name: &str, prefix: &str) -> bool {
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };
    match rest.rsplit_once('.') {
        Some((id, "tmp" | "claim")) => Uuid::parse_str(id).is_ok(),
        _ => false,
    }
}

impl SharedStore for FileSharedStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;

        // Write atomically (write to temp file, then rename)
        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        std::fs::write(&temp_path, value)?;

        // Set restrictive permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&temp_path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&temp_path, perms)?;
        }

        if let Err(e) = std::fs::rename(&temp_path, &path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn take(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match self.remove_stale(key, STALE_AFTER) {
            Ok(0) => {}
            Ok(n) => warn!("Removed {} stale files for {}", n, key),
            Err(e) => warn!("Failed to sweep stale files for {}: {}", key, e),
        }

        let claimed = path.with_extension(format!("{}.claim", Uuid::new_v4()));

        match std::fs::rename(&path, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let read = std::fs::read(&claimed);
        if let Err(e) = std::fs::remove_file(&claimed) {
            warn!("Failed to delete claimed record {}: {}", claimed.display(), e);
        }
        Ok(Some(read?))
    }
}

/// In-process store, for hosts that run both roles in one process and for tests.
#[derive(Debug, Default)]
pub struct MemorySharedStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| ShareBridgeError::Storage("Shared store lock poisoned".into()))
    }
}

impl SharedStore for MemorySharedStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }

    fn take(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries()?.remove(key))
    }
}

/// The single well-known handoff slot in a shared store.
#[derive(Clone)]
pub struct HandoffSlot {
    store: Arc<dyn SharedStore>,
    key: String,
}

impl HandoffSlot {
    pub fn new(store: Arc<dyn SharedStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Persist a record, overwriting any unread one.
    pub fn write(&self, record: &HandoffRecord) -> Result<()> {
        let bytes = record.encode()?;
        self.store
            .put(&self.key, &bytes)
            .map_err(|e| ShareBridgeError::HandoffWriteFailed(e.to_string()))?;
        debug!("Wrote {} handoff record ({} bytes)", record.kind, bytes.len());
        Ok(())
    }

    /// Read the pending record once. A corrupt record is deleted and
    /// reported as `HandoffDecodeFailed`.
    pub fn take(&self) -> Result<Option<HandoffRecord>> {
        let Some(bytes) = self.store.take(&self.key)? else {
            return Ok(None);
        };
        HandoffRecord::decode(&bytes).map(Some)
    }
}
