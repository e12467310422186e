// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side storage locations: the cookie jar and the local fallback store.
//!
//! Both are synchronous, mirroring `document.cookie` and `localStorage`.
//! The cookie table implements the browser's identity rule: a cookie is
//! keyed by (name, domain, host-only, path), so a removal written with a
//! different domain or path leaves the original in place.

pub mod file;
pub mod memory;

use std::net::IpAddr;

use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub use file::{FileCookieJar, FileLocalStore};
pub use memory::{MemoryCookieJar, MemoryLocalStore};

/// Fallback-store key holding the bearer token.
pub const TOKEN_KEY: &str = "token";
/// Fallback-store key holding the JSON of the last fetched profile.
pub const USER_KEY: &str = "user";
/// Fallback-store key holding a pending return-url.
pub const RETURN_URL_KEY: &str = "return_url";

/// Cookie access for the current origin.
pub trait CookieJar: Send + Sync {
    /// Value of the most specific cookie named `name` visible to this origin.
    fn get(&self, name: &str) -> Option<String>;

    /// Apply a `Set-Cookie`. A zero or negative `Max-Age` removes the cookie
    /// with the same identity.
    fn set(&self, cookie: Cookie<'static>) -> Result<(), StorageError>;
}

/// Origin-scoped key/value store.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str);
}

/// One stored cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    /// Cookie domain without a leading dot. For host-only cookies this is
    /// the host that set it.
    pub domain: String,
    pub host_only: bool,
    pub path: String,
    /// Expiry as epoch seconds; `None` for session cookies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl StoredCookie {
    fn same_identity(&self, other: &StoredCookie) -> bool {
        self.name == other.name
            && self.domain == other.domain
            && self.host_only == other.host_only
            && self.path == other.path
    }

    fn visible_to(&self, host: &str) -> bool {
        if self.host_only {
            self.domain == host
        } else {
            domain_matches(host, &self.domain)
        }
    }

    fn expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Cookie storage shared by the in-memory and file-backed jars.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CookieTable {
    pub cookies: Vec<StoredCookie>,
}

impl CookieTable {
    /// Apply a cookie write as seen from `host` at time `now`.
    pub fn apply(&mut self, host: &str, cookie: &Cookie<'_>, now: u64) -> Result<(), StorageError> {
        let host = host_without_port(host);
        let (domain, host_only) = match cookie.domain() {
            Some(d) => {
                let d = d.trim_start_matches('.').to_ascii_lowercase();
                if !domain_matches(&host, &d) {
                    return Err(StorageError::CookieRejected(format!(
                        "domain {d} does not cover host {host}"
                    )));
                }
                (d, false)
            }
            None => (host.clone(), true),
        };
        if cookie.same_site() == Some(SameSite::None) && cookie.secure() != Some(true) {
            return Err(StorageError::CookieRejected(format!(
                "{}: SameSite=None requires Secure",
                cookie.name()
            )));
        }

        let expires_at = match cookie.max_age() {
            Some(age) if age.whole_seconds() <= 0 => Some(0),
            Some(age) => Some(now.saturating_add(age.whole_seconds() as u64)),
            None => None,
        };
        let entry = StoredCookie {
            name: cookie.name().to_owned(),
            value: cookie.value().to_owned(),
            domain,
            host_only,
            path: cookie.path().unwrap_or("/").to_owned(),
            expires_at,
        };

        self.cookies.retain(|c| !c.same_identity(&entry) && !c.expired(now));
        if !entry.expired(now) {
            self.cookies.push(entry);
        }
        Ok(())
    }

    /// Most specific (longest path) live cookie named `name` visible to `host`.
    pub fn lookup(&self, host: &str, name: &str, now: u64) -> Option<&StoredCookie> {
        let host = host_without_port(host);
        self.cookies
            .iter()
            .filter(|c| c.name == name && !c.expired(now) && c.visible_to(&host))
            .max_by_key(|c| c.path.len())
    }

    pub fn prune(&mut self, now: u64) {
        self.cookies.retain(|c| !c.expired(now));
    }
}

/// Strip an optional `:port` suffix and IPv6 brackets; lowercase the rest.
pub fn host_without_port(host: &str) -> String {
    let host = host.trim();
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or_default().to_ascii_lowercase();
    }
    match host.rsplit_once(':') {
        // Bare IPv6 literal: more than one colon and no brackets.
        Some((name, _)) if !name.contains(':') => name.to_ascii_lowercase(),
        _ => host.to_ascii_lowercase(),
    }
}

/// RFC 6265 domain-match: `host` equals `domain` or is a subdomain of it.
pub fn domain_matches(host: &str, domain: &str) -> bool {
    if host == domain {
        return true;
    }
    if host.parse::<IpAddr>().is_ok() {
        return false;
    }
    host.strip_suffix(domain).is_some_and(|prefix| prefix.ends_with('.'))
}

pub(crate) fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
