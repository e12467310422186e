// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background reconciliation of the stored token against the cached profile.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::AuthApi;
use crate::cache::ProfileCache;
use crate::events::SessionEvent;
use crate::logout::LogoutReconciler;
use crate::token::TokenStore;

/// Re-derives session state from the token store on every tick.
pub struct AuthPoller<A> {
    tokens: Arc<TokenStore>,
    cache: ProfileCache<A>,
    reconciler: Arc<LogoutReconciler>,
    /// Route currently shown; enables the strict cross-app logout check.
    route: Mutex<Option<String>>,
    /// Token and user of the last `ProfileLoaded`; admin profiles are
    /// refetched every tick but announced once.
    loaded: Mutex<Option<(String, i64)>>,
    events: broadcast::Sender<SessionEvent>,
}

impl<A: AuthApi> AuthPoller<A> {
    pub fn new(
        tokens: Arc<TokenStore>,
        cache: ProfileCache<A>,
        reconciler: Arc<LogoutReconciler>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self { tokens, cache, reconciler, route: Mutex::new(None), loaded: Mutex::new(None), events }
    }

    pub fn set_route(&self, route: Option<&str>) {
        *self.route.lock() = route.map(str::to_owned);
    }

    pub fn route(&self) -> Option<String> {
        self.route.lock().clone()
    }

    /// One reconciliation pass. Returns the event it emitted, if any.
    pub async fn tick(&self) -> Option<SessionEvent> {
        let route = self.route();
        if let Some(navigation) = route.and_then(|path| self.reconciler.check_cross_app_logout(&path)) {
            self.cache.reset();
            self.loaded.lock().take();
            return self.emit(SessionEvent::ForcedSignOut { target: navigation.target() });
        }

        let Some(token) = self.tokens.read() else {
            self.loaded.lock().take();
            if self.cache.has_profile() {
                tracing::info!("token removed elsewhere, dropping cached profile");
                self.cache.reset();
                return self.emit(SessionEvent::SignedOutElsewhere);
            }
            self.cache.clear_breaker();
            return None;
        };

        if self.cache.has_profile() || self.cache.is_tripped(&token) {
            return None;
        }
        tracing::debug!("token without profile, fetching");
        match self.cache.get(Some(&token), false).await {
            Ok(Some(profile)) => {
                let key = (token.clone(), profile.id);
                let mut loaded = self.loaded.lock();
                if loaded.as_ref() == Some(&key) {
                    return None;
                }
                *loaded = Some(key);
                drop(loaded);
                self.emit(SessionEvent::ProfileLoaded { user_id: profile.id })
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(err = %e, "stored token rejected, purging local session");
                self.loaded.lock().take();
                self.tokens.purge();
                self.emit(SessionEvent::TokenRejected)
            }
        }
    }

    fn emit(&self, event: SessionEvent) -> Option<SessionEvent> {
        // No subscribers is fine.
        let _ = self.events.send(event.clone());
        Some(event)
    }
}

/// Spawn the poll loop. Stops when `shutdown` is cancelled, including
/// mid-tick, so nothing fires after teardown.
pub fn spawn_poller<A: AuthApi>(
    poller: Arc<AuthPoller<A>>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = poller.tick() => {}
            }
        }
        tracing::debug!("auth poller stopped");
    })
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
