// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed storage: JSON documents under a state directory with atomic
//! writes, so separate CLI invocations share one browser-like profile.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cookie::Cookie;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{epoch_secs, CookieJar, CookieTable, LocalStore};
use crate::error::StorageError;

/// Load a JSON document, returning the default value when the file is absent.
pub fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StorageError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(StorageError::Io(format!("{}: {e}", path.display()))),
    };
    serde_json::from_str(&contents)
        .map_err(|e| StorageError::Corrupt(format!("{}: {e}", path.display())))
}

/// Save a JSON document atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves never
/// share a `.tmp` file.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| StorageError::Io(format!("{}: {e}", dir.display())))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| StorageError::Corrupt(e.to_string()))?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json).map_err(|e| StorageError::Io(format!("{}: {e}", tmp_path.display())))?;
    std::fs::rename(&tmp_path, path).map_err(|e| StorageError::Io(format!("{}: {e}", path.display())))?;
    Ok(())
}

/// Cookie jar persisted to `cookies.json`.
pub struct FileCookieJar {
    host: String,
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCookieJar {
    pub fn new(host: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { host: host.into(), path: path.into(), lock: Mutex::new(()) }
    }

    fn load(&self) -> CookieTable {
        match load_json::<CookieTable>(&self.path) {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(err = %e, "discarding unreadable cookie jar");
                CookieTable::default()
            }
        }
    }
}

impl CookieJar for FileCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        let _guard = self.lock.lock();
        self.load().lookup(&self.host, name, epoch_secs()).map(|c| c.value.clone())
    }

    fn set(&self, cookie: Cookie<'static>) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let now = epoch_secs();
        let mut table = self.load();
        table.apply(&self.host, &cookie, now)?;
        table.prune(now);
        save_json(&self.path, &table)
    }
}

/// Local store persisted to `local.json`.
pub struct FileLocalStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileLocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    fn load(&self) -> BTreeMap<String, String> {
        match load_json(&self.path) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(err = %e, "discarding unreadable local store");
                BTreeMap::new()
            }
        }
    }
}

impl LocalStore for FileLocalStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock();
        self.load().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut map = self.load();
        map.insert(key.to_owned(), value.to_owned());
        save_json(&self.path, &map)
    }

    fn remove(&self, key: &str) {
        let _guard = self.lock.lock();
        let mut map = self.load();
        if map.remove(key).is_some() {
            if let Err(e) = save_json(&self.path, &map) {
                tracing::warn!(key, err = %e, "failed to persist local store removal");
            }
        }
    }
}
