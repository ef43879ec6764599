//! Durable key-value preference backends.
//!
//! Backends are synchronous; `PreferenceStore` moves their calls onto the
//! blocking pool.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use keyring::Entry;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::{Config, StorageKind, APP_NAME};

use super::StorageError;

/// A string-valued key-value store that survives process restarts
pub trait PreferenceBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

impl PreferenceBackend for Box<dyn PreferenceBackend> {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).write(key, value)
    }
}

/// Build the backend selected in the configuration
pub fn from_config(config: &Config) -> anyhow::Result<Box<dyn PreferenceBackend>> {
    Ok(match config.storage {
        StorageKind::File => Box::new(FileBackend::new(config.preferences_path()?)),
        StorageKind::Keyring => Box::new(KeyringBackend::new(APP_NAME)),
    })
}

// ============================================================================
// File
// ============================================================================

/// All preferences in one JSON object file.
///
/// Writes go to a sibling temp file that is renamed over the original, so a
/// reader never sees a half-written file.
pub struct FileBackend {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_map(&self) -> Result<Map<String, Value>, StorageError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StorageError::Encoding("preferences file is not a JSON object".to_string())),
            Err(e) => Err(StorageError::Encoding(e.to_string())),
        }
    }
}

impl PreferenceBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let map = self.load_map()?;
        Ok(map.get(key).and_then(Value::as_str).map(str::to_string))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;

        let mut map = match self.load_map() {
            Ok(map) => map,
            Err(StorageError::Encoding(e)) => {
                warn!(path = %self.path.display(), error = %e, "Replacing unreadable preferences file");
                Map::new()
            }
            Err(e) => return Err(e),
        };
        map.insert(key.to_string(), Value::String(value.to_string()));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(&Value::Object(map))
            .map_err(|e| StorageError::Encoding(e.to_string()))?;
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), key, "Preference written");
        Ok(())
    }
}

// ============================================================================
// Keyring
// ============================================================================

/// Preferences kept in the OS keychain, one entry per key
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Entry::new(&self.service, key).map_err(|e| StorageError::Keyring(e.to_string()))
    }
}

impl PreferenceBackend for KeyringBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::Keyring(e.to_string())),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| StorageError::Keyring(e.to_string()))
    }
}

// ============================================================================
// Memory
// ============================================================================

/// In-process backend. Write failures can be switched on to exercise error paths.
#[derive(Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw stored value, bypassing the codec
    pub fn with_value(key: &str, raw: &str) -> Self {
        let backend = Self::default();
        if let Ok(mut values) = backend.values.lock() {
            values.insert(key.to_string(), raw.to_string());
        }
        backend
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl PreferenceBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated write failure",
            )));
        }
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
