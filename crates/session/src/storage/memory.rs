// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process storage for tests and embedding.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cookie::Cookie;
use parking_lot::Mutex;

use super::{epoch_secs, CookieJar, CookieTable, LocalStore, StoredCookie};
use crate::error::StorageError;

/// Cookie jar backed by a shared in-memory table.
///
/// Jars created with [`MemoryCookieJar::for_host`] see the same table from a
/// different origin, which models the sibling deployment reading (or
/// clearing) the shared-domain session cookie.
pub struct MemoryCookieJar {
    host: String,
    table: Arc<Mutex<CookieTable>>,
    blocked: AtomicBool,
}

impl MemoryCookieJar {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            table: Arc::new(Mutex::new(CookieTable::default())),
            blocked: AtomicBool::new(false),
        }
    }

    /// A jar for another origin sharing this jar's cookie table.
    pub fn for_host(&self, host: impl Into<String>) -> Self {
        Self { host: host.into(), table: Arc::clone(&self.table), blocked: AtomicBool::new(false) }
    }

    /// Reject every write, as a browser with cookies disabled would.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::Relaxed);
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Every live cookie in the shared table.
    pub fn entries(&self) -> Vec<StoredCookie> {
        let mut table = self.table.lock();
        table.prune(epoch_secs());
        table.cookies.clone()
    }
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        let table = self.table.lock();
        table.lookup(&self.host, name, epoch_secs()).map(|c| c.value.clone())
    }

    fn set(&self, cookie: Cookie<'static>) -> Result<(), StorageError> {
        if self.blocked.load(Ordering::Relaxed) {
            return Err(StorageError::CookieRejected("cookies are blocked".into()));
        }
        self.table.lock().apply(&self.host, &cookie, epoch_secs())
    }
}

/// Local store backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryLocalStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}
