//! Durable record storage.
//!
//! Each subsystem owns exactly one record, addressed by a stable key and
//! written as a whole. Records are JSON documents so they stay
//! human-inspectable; readers ignore unknown fields and default missing ones.

use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub trait DurableStore: Send + Sync {
    /// `Ok(None)` when no record has ever been written under `key`.
    fn read(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the record under `key`. Must never leave a partial record behind.
    fn write(&self, key: &str, doc: &Value) -> Result<(), StoreError>;
}

/// The two operations every stateful subsystem exposes to the control loop.
pub trait Persistent {
    /// Restore prior state. Returns true if a record was found and applied.
    fn load(&mut self) -> bool;

    /// Overwrite the stored record with the current state. Failures are
    /// logged; in-memory state stays authoritative.
    fn save(&self);
}

/// Decode the record under `key`, logging and discarding anything unreadable.
pub fn load_record<T: DeserializeOwned>(store: &dyn DurableStore, key: &str) -> Option<T> {
    match store.read(key) {
        Ok(Some(doc)) => match serde_json::from_value(doc) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::error!("Discarding unreadable '{}' record: {}", key, e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::error!("Failed to read '{}' record: {}", key, e);
            None
        }
    }
}

/// Encode and write `record` under `key`. Returns whether the write landed.
pub fn save_record<T: Serialize>(store: &dyn DurableStore, key: &str, record: &T) -> bool {
    let doc = match serde_json::to_value(record) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::error!("Failed to encode '{}' record: {}", key, e);
            return false;
        }
    };
    match store.write(key, &doc) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Failed to save '{}' record: {}", key, e);
            false
        }
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

// ============================================================================
// JSON files on disk
// ============================================================================

/// One pretty-printed `<key>.json` file per record inside a directory.
///
/// Writes go to a sibling temp file which is synced and then renamed over the
/// target, so a crash mid-write leaves the previous record intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl DurableStore for JsonFileStore {
    fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        validate_key(key)?;
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StoreError::Encoding {
                key: key.to_string(),
                source,
            })
    }

    fn write(&self, key: &str, doc: &Value) -> Result<(), StoreError> {
        validate_key(key)?;
        let io_err = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };
        let body = serde_json::to_vec_pretty(doc).map_err(|source| StoreError::Encoding {
            key: key.to_string(),
            source,
        })?;

        let target = self.path_for(key);
        let tmp = self.root.join(format!(".{key}.json.tmp"));
        {
            let mut file = fs::File::create(&tmp).map_err(io_err)?;
            file.write_all(&body).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp, &target).map_err(io_err)?;
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Volatile store used by tests and by `--ephemeral` runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let docs = self.docs.lock().unwrap_or_else(|p| p.into_inner());
        let mut keys: Vec<String> = docs.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl DurableStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        validate_key(key)?;
        let docs = self.docs.lock().unwrap_or_else(|p| p.into_inner());
        Ok(docs.get(key).cloned())
    }

    fn write(&self, key: &str, doc: &Value) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut docs = self.docs.lock().unwrap_or_else(|p| p.into_inner());
        docs.insert(key.to_string(), doc.clone());
        Ok(())
    }
}
