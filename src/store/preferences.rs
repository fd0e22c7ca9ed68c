//! Preference store implementations

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;

use fd_lock::RwLock;
use parking_lot::Mutex;

use super::PreferenceStore;
use crate::error::{CompatError, ErrorCategory, ErrorKind, Result};
use crate::file_ops;

/// Keeps preferences in process memory.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn get_or_insert_with(
        &self,
        key: &str,
        init: &mut dyn FnMut() -> Result<String>,
    ) -> Result<String> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(key) {
            return Ok(existing.clone());
        }
        let value = init()?;
        entries.insert(key.to_owned(), value.clone());
        Ok(value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Keeps preferences in a JSON object file.
///
/// The file is re-read on every access so several stores (or processes)
/// pointing at the same path observe each other's writes. Every access holds
/// an exclusive OS lock on a sidecar `<file>.lock`, so a read-check-write
/// sequence is atomic across instances and processes. Writes replace the
/// file atomically with owner-only permissions.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    lock_path: PathBuf,
    lock: Mutex<()>,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.file_name().map(OsString::from).unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self {
            path,
            lock_path,
            lock: Mutex::new(()),
        }
    }

    /// Runs `f` holding the in-process mutex and the exclusive file lock.
    fn locked<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock();
        let mut file_lock = RwLock::new(self.open_lock_file()?);
        let _file_guard = file_lock.write().map_err(|e| {
            CompatError::storage(format!("failed to lock {}", self.lock_path.display()), e)
        })?;
        f()
    }

    fn open_lock_file(&self) -> Result<File> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(false);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options.open(&self.lock_path).map_err(|e| {
            CompatError::storage(format!("failed to open {}", self.lock_path.display()), e)
        })
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(CompatError::storage(
                    format!("failed to read preferences from {}", self.path.display()),
                    e,
                ));
            }
        };
        serde_json::from_slice(&data).map_err(|e| {
            CompatError::storage(
                format!("preferences file {} is corrupt", self.path.display()),
                e,
            )
        })
    }

    fn store(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let data = serde_json::to_vec_pretty(entries).map_err(|e| {
            CompatError::with_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "failed to serialize preferences",
                e,
            )
        })?;
        file_ops::write_file_atomic(&self.path, &data).map_err(|e| {
            CompatError::storage(
                format!("failed to persist preferences to {}", self.path.display()),
                e,
            )
        })
    }
}

impl PreferenceStore for FilePreferences {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.locked(|| Ok(self.load()?.remove(key)))
    }

    fn get_or_insert_with(
        &self,
        key: &str,
        init: &mut dyn FnMut() -> Result<String>,
    ) -> Result<String> {
        self.locked(|| {
            let mut entries = self.load()?;
            if let Some(existing) = entries.get(key) {
                return Ok(existing.clone());
            }
            let value = init()?;
            entries.insert(key.to_owned(), value.clone());
            self.store(&entries)?;
            Ok(value)
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.locked(|| {
            let mut entries = self.load()?;
            if entries.remove(key).is_some() {
                self.store(&entries)?;
            }
            Ok(())
        })
    }
}
