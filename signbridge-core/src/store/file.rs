//! JSON file credential storage.
//!
//! Entries live in a single JSON document under the platform-specific
//! data directory:
//!
//! - Linux: `~/.local/share/signbridge/store.json`
//! - macOS: `~/Library/Application Support/com.raibid-labs.signbridge/store.json`
//! - Windows: `%APPDATA%\raibid-labs\signbridge\data\store.json`
//!
//! The file is re-read on every access so the CLI and the daemon observe
//! each other's writes (including refreshed tokens).

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{CredentialStore, Secret, StoreError, expiry_from_ttl, is_expired};

/// Internal storage format.
#[derive(Debug, Serialize, Deserialize)]
struct StoreData {
    /// Version of the store format (for future migrations).
    version: u32,

    /// All stored entries keyed by store key.
    entries: BTreeMap<String, FileEntry>,
}

impl Default for StoreData {
    fn default() -> Self {
        Self {
            version: 1,
            entries: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    value: Secret,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// Disk-backed credential store.
///
/// Writes within one process are serialized by a mutex; across processes the
/// last writer wins, which is acceptable for a cache that is rebuilt on miss.
pub struct FileStore {
    /// Path to the JSON file.
    path: PathBuf,

    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    /// Default storage path for the store file.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dirs = directories::ProjectDirs::from("com", "raibid-labs", "signbridge").ok_or_else(
            || StoreError::BackendError {
                message: "data directory not available".to_string(),
            },
        )?;

        Ok(dirs.data_dir().join("store.json"))
    }

    /// Open (or lazily create) the store at `path`.
    ///
    /// Parent directories are created immediately; the file itself is written
    /// on the first `set`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StoreData, StoreError> {
        if !self.path.exists() {
            return Ok(StoreData::default());
        }

        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(StoreData::default());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, data: &StoreData) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");

        // A leftover temp file would keep its old mode; start fresh.
        match fs::remove_file(&tmp) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let mut file = create_private(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Create a new file at `path`, readable and writable by the owner only.
#[cfg(unix)]
fn create_private(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        let _guard = self.lock.lock();
        let data = self.load()?;
        Ok(data
            .entries
            .get(key)
            .filter(|entry| !is_expired(entry.expires_at))
            .map(|entry| entry.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        secret: &Secret,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut data = self.load()?;
        data.entries.retain(|_, entry| !is_expired(entry.expires_at));
        data.entries.insert(
            key.to_string(),
            FileEntry {
                value: secret.clone(),
                expires_at: expiry_from_ttl(ttl),
            },
        );
        self.save(&data)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut data = self.load()?;
        if data.entries.remove(key).is_some() {
            self.save(&data)?;
        }
        Ok(())
    }
}
