// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide cache of the authenticated profile.
//!
//! Three disciplines live here:
//! - freshness: a cached profile is served without a request for a fixed window;
//! - coalescing: at most one fetch is in flight, and every concurrent caller
//!   awaits the same shared future;
//! - circuit breaker: a token that failed authentication is remembered and
//!   never fetched again until the token changes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::api::AuthApi;
use crate::error::SessionError;
use crate::profile::Profile;
use crate::retry::{fetch_profile_with_retry, RetryPolicy};

/// Profile freshness window.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(300);

type SharedFetch = Shared<BoxFuture<'static, Result<Profile, SessionError>>>;

struct InFlight {
    id: u64,
    token: String,
    fetch: SharedFetch,
}

#[derive(Default)]
struct CacheState {
    profile: Option<Profile>,
    fetched_at: Option<Instant>,
    /// Token that last failed authentication.
    tripped: Option<String>,
    in_flight: Option<InFlight>,
    /// Bumped on reset; fetches started under an older epoch do not write back.
    epoch: u64,
}

impl CacheState {
    fn fresh(&self, window: Duration) -> Option<&Profile> {
        let fetched_at = self.fetched_at?;
        if fetched_at.elapsed() < window {
            self.profile.as_ref()
        } else {
            None
        }
    }

    fn clear_profile(&mut self) {
        self.profile = None;
        self.fetched_at = None;
    }

    /// Forget the breaker unless it was tripped by `token`.
    fn observe_token(&mut self, token: Option<&str>) {
        if self.tripped.is_some() && self.tripped.as_deref() != token {
            tracing::debug!("token changed, clearing circuit breaker");
            self.tripped = None;
        }
    }
}

struct Inner<A> {
    api: Arc<A>,
    state: Mutex<CacheState>,
    freshness: Duration,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

/// Shared handle to the profile cache. Clones share state.
pub struct ProfileCache<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for ProfileCache<A> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

enum Step {
    Blocked,
    Await(SharedFetch),
    /// A fetch for a different token is in flight; wait for it, then retry.
    Wait(SharedFetch),
}

impl<A: AuthApi> ProfileCache<A> {
    pub fn new(api: Arc<A>, freshness: Duration, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                state: Mutex::new(CacheState::default()),
                freshness,
                retry,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Current profile for `token`.
    ///
    /// Serves a fresh cached profile without a request unless
    /// `force_refresh`. Auth failures are returned as errors (the caller
    /// clears the stored token); exhausted retries fall back to any cached
    /// profile, however stale, or `None`.
    pub async fn get(
        &self,
        token: Option<&str>,
        force_refresh: bool,
    ) -> Result<Option<Profile>, SessionError> {
        if !force_refresh {
            if let Some(profile) = self.inner.state.lock().fresh(self.inner.freshness) {
                return Ok(Some(profile.clone()));
            }
        }
        let Some(token) = token else {
            let mut state = self.inner.state.lock();
            state.clear_profile();
            state.observe_token(None);
            return Ok(None);
        };

        match self.fetch(token).await {
            Ok(profile) => Ok(Some(profile)),
            Err(SessionError::TokenBlocked) => Ok(None),
            Err(e) if e.is_auth() => Err(e),
            Err(e) => {
                let fallback = self.inner.state.lock().profile.clone();
                if fallback.is_some() {
                    tracing::warn!(err = %e, "serving stale profile");
                }
                Ok(fallback)
            }
        }
    }

    /// Fetch the profile for `token`, bypassing freshness.
    ///
    /// Honors the circuit breaker ([`SessionError::TokenBlocked`]) and joins
    /// an in-flight fetch for the same token. No stale fallback.
    pub async fn fetch(&self, token: &str) -> Result<Profile, SessionError> {
        loop {
            let step = {
                let mut state = self.inner.state.lock();
                state.observe_token(Some(token));
                if state.tripped.as_deref() == Some(token) {
                    state.clear_profile();
                    Step::Blocked
                } else {
                    match state.in_flight {
                        Some(ref f) if f.token == token => Step::Await(f.fetch.clone()),
                        Some(ref f) => Step::Wait(f.fetch.clone()),
                        None => Step::Await(self.start_fetch(&mut state, token)),
                    }
                }
            };

            match step {
                Step::Blocked => {
                    tracing::debug!("circuit breaker open, skipping profile fetch");
                    return Err(SessionError::TokenBlocked);
                }
                Step::Await(fetch) => return fetch.await,
                Step::Wait(other) => {
                    let _ = other.await;
                }
            }
        }
    }

    fn start_fetch(&self, state: &mut CacheState, token: &str) -> SharedFetch {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let epoch = state.epoch;
        let inner = Arc::clone(&self.inner);
        let owned = token.to_owned();
        let fetch = async move {
            let result = fetch_profile_with_retry(inner.api.as_ref(), &owned, inner.retry).await;
            inner.settle(id, epoch, &owned, &result);
            result
        }
        .boxed()
        .shared();
        state.in_flight = Some(InFlight { id, token: token.to_owned(), fetch: fetch.clone() });
        fetch
    }

    /// Cached profile regardless of freshness.
    pub fn cached(&self) -> Option<Profile> {
        self.inner.state.lock().profile.clone()
    }

    pub fn has_profile(&self) -> bool {
        self.inner.state.lock().profile.is_some()
    }

    /// True when `token` is the token that tripped the breaker.
    pub fn is_tripped(&self, token: &str) -> bool {
        self.inner.state.lock().tripped.as_deref() == Some(token)
    }

    pub fn clear_breaker(&self) {
        self.inner.state.lock().tripped = None;
    }

    /// Drop the cached profile; the breaker is kept.
    pub fn invalidate(&self) {
        self.inner.state.lock().clear_profile();
    }

    /// Drop the profile and breaker, and detach any in-flight fetch so its
    /// result is not written back.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.clear_profile();
        state.tripped = None;
        state.in_flight = None;
        state.epoch += 1;
    }
}

impl<A> Inner<A> {
    fn settle(&self, id: u64, epoch: u64, token: &str, result: &Result<Profile, SessionError>) {
        let mut state = self.state.lock();
        if state.in_flight.as_ref().is_some_and(|f| f.id == id) {
            state.in_flight = None;
        }
        if state.epoch != epoch {
            tracing::debug!("cache reset during fetch, discarding result");
            return;
        }
        match result {
            Ok(profile) if profile.roles.is_admin() => {
                tracing::debug!(user_id = profile.id, "elevated profile, not caching");
            }
            Ok(profile) => {
                state.profile = Some(profile.clone());
                state.fetched_at = Some(Instant::now());
            }
            Err(e) if e.is_auth() => {
                tracing::warn!(err = %e, "profile rejected, opening circuit breaker");
                state.tripped = Some(token.to_owned());
                state.clear_profile();
            }
            Err(e) => {
                tracing::warn!(err = %e, "profile fetch failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
