// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application-root owner of all session state.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::api::AuthApi;
use crate::cache::ProfileCache;
use crate::callback::{CallbackFlow, CallbackOutcome, CallbackRequest, CallbackSettings};
use crate::config::BridgeConfig;
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::logout::LogoutReconciler;
use crate::poller::{spawn_poller, AuthPoller};
use crate::profile::Profile;
use crate::redirect::{Navigation, RedirectResolver};
use crate::storage::{CookieJar, LocalStore};
use crate::token::TokenStore;

/// Owns the token store, profile cache, resolver, and poller.
///
/// Clones of the inner handles are passed to every component; the service
/// itself is the single construction and teardown point. Dropping it stops
/// the poller.
pub struct SessionService<A> {
    config: BridgeConfig,
    api: Arc<A>,
    tokens: Arc<TokenStore>,
    cache: ProfileCache<A>,
    resolver: Arc<RedirectResolver>,
    reconciler: Arc<LogoutReconciler>,
    poller: Arc<AuthPoller<A>>,
    events: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl<A: AuthApi> SessionService<A> {
    pub fn new(
        config: BridgeConfig,
        api: Arc<A>,
        cookies: Arc<dyn CookieJar>,
        local: Arc<dyn LocalStore>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let routes = config.routes()?;
        let tokens = Arc::new(TokenStore::new(cookies, local, config.cookie_policy()));
        let cache = ProfileCache::new(Arc::clone(&api), config.freshness(), config.retry_policy());
        let resolver = Arc::new(RedirectResolver::new(routes.clone()));
        let reconciler = Arc::new(LogoutReconciler::new(Arc::clone(&tokens), routes));
        let (events, _) = broadcast::channel(64);
        let poller = Arc::new(AuthPoller::new(
            Arc::clone(&tokens),
            cache.clone(),
            Arc::clone(&reconciler),
            events.clone(),
        ));
        Ok(Self {
            config,
            api,
            tokens,
            cache,
            resolver,
            reconciler,
            poller,
            events,
            shutdown: CancellationToken::new(),
            poll_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn cache(&self) -> &ProfileCache<A> {
        &self.cache
    }

    pub fn resolver(&self) -> &RedirectResolver {
        &self.resolver
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// A login flow bound to this service's state.
    pub fn callback(&self) -> CallbackFlow<A> {
        CallbackFlow::new(
            Arc::clone(&self.api),
            Arc::clone(&self.tokens),
            self.cache.clone(),
            Arc::clone(&self.resolver),
            CallbackSettings::from_config(&self.config),
        )
    }

    /// Run the login flow for an identity-redirect URL.
    pub async fn handle_callback(&self, url: &Url) -> CallbackOutcome<A> {
        let outcome = self.callback().run(&CallbackRequest::from_url(url)).await;
        match outcome {
            CallbackOutcome::Redirect(_) | CallbackOutcome::AgreementRequired(_) => {
                if let Some(profile) = self.tokens.stored_user() {
                    self.emit(SessionEvent::SignedIn { user_id: profile.id });
                }
            }
            CallbackOutcome::Failed { .. } => {}
        }
        outcome
    }

    /// Profile for the stored token, through the cache. An auth failure
    /// purges local state.
    pub async fn current_profile(&self, force_refresh: bool) -> Result<Option<Profile>, SessionError> {
        let token = self.tokens.read();
        match self.cache.get(token.as_deref(), force_refresh).await {
            Err(e) if e.is_auth() => {
                tracing::warn!(err = %e, "stored token rejected, purging local session");
                self.tokens.purge();
                self.emit(SessionEvent::TokenRejected);
                Err(e)
            }
            other => other,
        }
    }

    /// Route shown by the embedding page; protected routes get the strict
    /// cross-app logout check on every poll.
    pub fn set_route(&self, route: Option<&str>) {
        self.poller.set_route(route);
    }

    /// Start the background poller. Returns false if it is already running
    /// or the service was shut down.
    pub fn start_poller(&self) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        let mut task = self.poll_task.lock();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        let interval = self.config.poll_interval();
        tracing::debug!(?interval, "starting auth poller");
        *task = Some(spawn_poller(Arc::clone(&self.poller), interval, self.shutdown.clone()));
        true
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// One reconciliation pass outside the background loop.
    pub async fn poll_once(&self) -> Option<SessionEvent> {
        self.poller.tick().await
    }

    /// Strict cross-app logout check for `path`; see [`LogoutReconciler`].
    pub fn check_cross_app_logout(&self, path: &str) -> Option<Navigation> {
        let navigation = self.reconciler.check_cross_app_logout(path)?;
        self.cache.reset();
        self.emit(SessionEvent::ForcedSignOut { target: navigation.target() });
        Some(navigation)
    }

    /// Apply the `logged_out` URL signal; returns the stripped URL.
    pub fn apply_logged_out_signal(&self, url: &Url) -> Option<Url> {
        let stripped = self.reconciler.apply_logged_out_signal(url)?;
        self.cache.reset();
        self.emit(SessionEvent::LoggedOutSignal);
        Some(stripped)
    }

    /// Remove every local auth artifact and reset the cache.
    pub fn purge(&self) {
        self.tokens.purge();
        self.cache.reset();
    }

    /// Sign out locally and return the sibling sign-out navigation.
    pub fn logout(&self) -> Navigation {
        tracing::info!("signing out");
        self.purge();
        self.reconciler.sign_out_navigation()
    }

    /// Stop the poller. Terminal: the poller cannot be restarted.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Shut down and wait for the poller task to exit.
    pub async fn stop(&self) {
        self.shutdown();
        let task = self.poll_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl<A> Drop for SessionService<A> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
