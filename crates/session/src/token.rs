// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer token persistence across the session cookie and the local fallback.
//!
//! The cookie is canonical (the sibling deployment reads it); the fallback
//! store covers browsers that refuse the cookie write. The token is never
//! parsed here.

use std::sync::Arc;

use crate::cookies::{CookiePolicy, RETURN_URL_COOKIE, SESSION_COOKIE};
use crate::error::{SessionError, StorageError};
use crate::profile::Profile;
use crate::storage::{CookieJar, LocalStore, RETURN_URL_KEY, TOKEN_KEY, USER_KEY};

/// Facade over both storage locations, scoped by one [`CookiePolicy`].
pub struct TokenStore {
    cookies: Arc<dyn CookieJar>,
    local: Arc<dyn LocalStore>,
    policy: CookiePolicy,
}

impl TokenStore {
    pub fn new(cookies: Arc<dyn CookieJar>, local: Arc<dyn LocalStore>, policy: CookiePolicy) -> Self {
        Self { cookies, local, policy }
    }

    pub fn policy(&self) -> &CookiePolicy {
        &self.policy
    }

    /// Write the token to the cookie and mirror it into the fallback store.
    ///
    /// A rejected cookie write is logged and tolerated; only a fallback
    /// write failure is returned.
    pub fn persist(&self, token: &str) -> Result<(), StorageError> {
        if let Err(e) = self.cookies.set(self.policy.session_cookie(token)) {
            tracing::warn!(err = %e, "session cookie write failed, relying on local fallback");
        }
        self.local.set(TOKEN_KEY, token)
    }

    /// The cookie token if present, otherwise the fallback token.
    pub fn read(&self) -> Option<String> {
        self.cookie_token().or_else(|| self.fallback_token())
    }

    pub fn cookie_token(&self) -> Option<String> {
        self.cookies.get(SESSION_COOKIE).filter(|t| !t.is_empty())
    }

    pub fn fallback_token(&self) -> Option<String> {
        self.local.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Confirm a just-persisted token reads back from both the resolved
    /// location and the fallback store.
    pub fn verify(&self, token: &str) -> Result<(), SessionError> {
        if self.read().as_deref() != Some(token) {
            return Err(SessionError::Verification("token does not read back"));
        }
        if self.fallback_token().as_deref() != Some(token) {
            return Err(SessionError::Verification("fallback store missing token"));
        }
        Ok(())
    }

    /// Remove the token from both locations.
    pub fn clear(&self) {
        if let Err(e) = self.cookies.set(self.policy.removal(SESSION_COOKIE)) {
            tracing::warn!(err = %e, "session cookie removal failed");
        }
        self.local.remove(TOKEN_KEY);
    }

    /// Mirror the fetched profile into the fallback store.
    pub fn store_user(&self, profile: &Profile) {
        let json = match serde_json::to_string(profile) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(err = %e, "failed to encode profile");
                return;
            }
        };
        if let Err(e) = self.local.set(USER_KEY, &json) {
            tracing::warn!(err = %e, "failed to store profile in local fallback");
        }
    }

    /// The profile last mirrored into the fallback store.
    pub fn stored_user(&self) -> Option<Profile> {
        let raw = self.local.get(USER_KEY)?;
        serde_json::from_str(&raw).ok()
    }

    /// True when the fallback store holds any user data.
    pub fn has_stored_user(&self) -> bool {
        self.local.get(USER_KEY).is_some_and(|raw| !raw.is_empty())
    }

    /// Read and delete the return-url cookie. Deleted before returning, so
    /// the value can never be consumed twice.
    pub fn take_return_url(&self) -> Option<String> {
        let value = self.cookies.get(RETURN_URL_COOKIE).filter(|v| !v.is_empty());
        if value.is_some() {
            self.discard_return_url_cookie();
        }
        value
    }

    pub fn discard_return_url_cookie(&self) {
        if let Err(e) = self.cookies.set(self.policy.removal(RETURN_URL_COOKIE)) {
            tracing::warn!(err = %e, "return-url cookie removal failed");
        }
    }

    /// Persist a pending destination in the fallback store and a 1-hour cookie.
    pub fn save_pending_return(&self, destination: &str) {
        if let Err(e) = self.local.set(RETURN_URL_KEY, destination) {
            tracing::warn!(err = %e, "failed to store pending return-url");
        }
        if let Err(e) = self.cookies.set(self.policy.return_url_cookie(destination)) {
            tracing::warn!(err = %e, "failed to write return-url cookie");
        }
    }

    pub fn pending_return(&self) -> Option<String> {
        self.local.get(RETURN_URL_KEY)
    }

    /// Remove every local auth artifact: both token locations, the stored
    /// profile, and any pending return-url.
    pub fn purge(&self) {
        self.clear();
        self.discard_return_url_cookie();
        self.local.remove(USER_KEY);
        self.local.remove(RETURN_URL_KEY);
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
