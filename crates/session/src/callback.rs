// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot login flow run when a token arrives on the identity-redirect URL.
//!
//! ```text
//! Start → TokenExtracted → TokenPersisted → ProfileFetching
//!       → ProfileFetched → [AgreementCheck] → Redirecting
//!       ↘ FetchFailed → Failed → SignedOutRedirect
//! ```
//!
//! The flow has no cancellation path: every run ends in a navigation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use percent_encoding::percent_decode;
use url::{form_urlencoded, Url};

use crate::agreement::{check_agreement, AgreementGate, AgreementStatus};
use crate::api::AuthApi;
use crate::cache::ProfileCache;
use crate::config::BridgeConfig;
use crate::error::{GateError, SessionError};
use crate::profile::{Agreement, Profile};
use crate::redirect::{Navigation, RedirectResolver};
use crate::token::TokenStore;

/// Path segment preceding a path-delivered token.
const CALLBACK_SEGMENT: &str = "callback";
/// Prefix of a token-shaped raw query string.
const TOKEN_PREFIX: &str = "eyJ";

/// Token-bearing parts of the identity-redirect URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackRequest {
    pub path_token: Option<String>,
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
}

impl CallbackRequest {
    pub fn new(path_token: Option<String>, query: Option<String>) -> Self {
        Self { path_token, query }
    }

    /// Split a callback URL. The path token is the (percent-decoded) segment
    /// after `callback`.
    pub fn from_url(url: &Url) -> Self {
        let path_token = url.path_segments().and_then(|mut segments| {
            segments.by_ref().find(|s| *s == CALLBACK_SEGMENT)?;
            let raw = segments.next()?;
            percent_decode(raw.as_bytes()).decode_utf8().ok().map(|s| s.into_owned())
        });
        Self { path_token, query: url.query().map(str::to_owned) }
    }

    fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    }

    /// Path token, else the `token` query parameter, else the whole raw
    /// query when it is token-shaped.
    pub fn token(&self) -> Option<String> {
        if let Some(token) = self.path_token.as_deref().filter(|t| !t.is_empty()) {
            return Some(token.to_owned());
        }
        if let Some(token) = self.query_param("token") {
            return Some(token);
        }
        self.query.as_deref().filter(|raw| looks_like_token(raw)).map(str::to_owned)
    }

    pub fn return_url(&self) -> Option<String> {
        self.query_param("return_url")
    }
}

fn looks_like_token(raw: &str) -> bool {
    raw.starts_with(TOKEN_PREFIX) && raw.contains('.')
}

/// States of the login flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackPhase {
    Start,
    TokenExtracted,
    TokenPersisted,
    ProfileFetching,
    ProfileFetched,
    FetchFailed,
    AgreementCheck,
    Redirecting,
    Failed,
    SignedOutRedirect,
}

impl CallbackPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::TokenExtracted => "token_extracted",
            Self::TokenPersisted => "token_persisted",
            Self::ProfileFetching => "profile_fetching",
            Self::ProfileFetched => "profile_fetched",
            Self::FetchFailed => "fetch_failed",
            Self::AgreementCheck => "agreement_check",
            Self::Redirecting => "redirecting",
            Self::Failed => "failed",
            Self::SignedOutRedirect => "signed_out_redirect",
        }
    }
}

impl fmt::Display for CallbackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flow parameters taken from [`BridgeConfig`].
#[derive(Debug, Clone)]
pub struct CallbackSettings {
    pub timezone: String,
    pub agreement_kind: String,
    /// Delay between the failure message and the sign-in redirect.
    pub failure_delay: Duration,
}

impl CallbackSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            timezone: config.timezone.clone(),
            agreement_kind: config.agreement_type.clone(),
            failure_delay: config.failure_delay(),
        }
    }
}

/// Terminal result of [`CallbackFlow::run`].
pub enum CallbackOutcome<A> {
    Redirect(Navigation),
    /// Redirect deferred until the agreement is accepted or skipped.
    AgreementRequired(PendingAgreement<A>),
    /// Local state is already purged; show `message`, then perform
    /// `navigation` after `delay`.
    Failed { error: SessionError, message: String, delay: Duration, navigation: Navigation },
}

impl<A> CallbackOutcome<A> {
    /// Navigation to perform now, if the flow finished.
    pub fn navigation(&self) -> Option<&Navigation> {
        match self {
            Self::Redirect(navigation) | Self::Failed { navigation, .. } => Some(navigation),
            Self::AgreementRequired(_) => None,
        }
    }
}

impl<A> fmt::Debug for CallbackOutcome<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redirect(navigation) => f.debug_tuple("Redirect").field(navigation).finish(),
            Self::AgreementRequired(pending) => {
                f.debug_tuple("AgreementRequired").field(pending).finish()
            }
            Self::Failed { error, message, delay, navigation } => f
                .debug_struct("Failed")
                .field("error", error)
                .field("message", message)
                .field("delay", delay)
                .field("navigation", navigation)
                .finish(),
        }
    }
}

/// Phases entered so far, shared with a paused flow's deferred redirect.
type History = Arc<Mutex<Vec<CallbackPhase>>>;

fn record(history: &History, phase: CallbackPhase) {
    tracing::debug!(%phase, "callback transition");
    history.lock().push(phase);
}

/// Deferred redirect: everything `Redirecting` needs once the gate clears.
struct DeferredRedirect {
    history: History,
    tokens: Arc<TokenStore>,
    resolver: Arc<RedirectResolver>,
    profile: Profile,
    return_url: Option<String>,
}

impl DeferredRedirect {
    fn navigate(&self) -> Navigation {
        record(&self.history, CallbackPhase::Redirecting);
        let navigation =
            self.resolver.resolve_and_commit(&self.tokens, &self.profile, self.return_url.as_deref());
        tracing::info!(user_id = self.profile.id, target = %navigation.target(), "login redirect");
        navigation
    }
}

/// A login paused on the agreement gate.
pub struct PendingAgreement<A> {
    gate: AgreementGate,
    api: Arc<A>,
    token: String,
    redirect: DeferredRedirect,
}

impl<A> fmt::Debug for PendingAgreement<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAgreement")
            .field("gate", &self.gate)
            .field("user_id", &self.redirect.profile.id)
            .finish()
    }
}

impl<A: AuthApi> PendingAgreement<A> {
    pub fn agreement(&self) -> &Agreement {
        self.gate.agreement()
    }

    pub fn gate(&self) -> &AgreementGate {
        &self.gate
    }

    /// Feed scroll geometry to the gate.
    pub fn gate_mut(&mut self) -> &mut AgreementGate {
        &mut self.gate
    }

    pub fn profile(&self) -> &Profile {
        &self.redirect.profile
    }

    /// Accept and resume the flow. On error the still-open gate is handed
    /// back so the accept can be retried; on success it is consumed, so the
    /// redirect runs exactly once.
    pub async fn accept(mut self) -> Result<Navigation, (Self, GateError)> {
        if let Err(e) = self.gate.accept(self.api.as_ref(), &self.token).await {
            return Err((self, e));
        }
        Ok(self.redirect.navigate())
    }

    /// Continue without accepting.
    pub fn skip(self) -> Navigation {
        tracing::info!(uuid = %self.gate.agreement().uuid, "agreement skipped");
        self.redirect.navigate()
    }
}

/// The login state machine. One instance per callback.
pub struct CallbackFlow<A> {
    api: Arc<A>,
    tokens: Arc<TokenStore>,
    cache: ProfileCache<A>,
    resolver: Arc<RedirectResolver>,
    settings: CallbackSettings,
    history: History,
}

impl<A: AuthApi> CallbackFlow<A> {
    pub fn new(
        api: Arc<A>,
        tokens: Arc<TokenStore>,
        cache: ProfileCache<A>,
        resolver: Arc<RedirectResolver>,
        settings: CallbackSettings,
    ) -> Self {
        Self { api, tokens, cache, resolver, settings, history: History::default() }
    }

    /// Phases entered so far, in order.
    pub fn history(&self) -> Vec<CallbackPhase> {
        self.history.lock().clone()
    }

    pub fn phase(&self) -> CallbackPhase {
        self.history.lock().last().copied().unwrap_or(CallbackPhase::Start)
    }

    fn enter(&self, phase: CallbackPhase) {
        record(&self.history, phase);
    }

    /// Run the flow to its terminal outcome.
    pub async fn run(&mut self, request: &CallbackRequest) -> CallbackOutcome<A> {
        self.history = History::default();
        self.enter(CallbackPhase::Start);

        let Some(token) = request.token() else {
            return self.fail(SessionError::MissingToken);
        };
        self.enter(CallbackPhase::TokenExtracted);

        if let Err(e) = self.tokens.persist(&token) {
            return self.fail(e.into());
        }
        self.enter(CallbackPhase::TokenPersisted);
        self.spawn_timezone_update(&token);

        self.enter(CallbackPhase::ProfileFetching);
        let profile = match self.cache.fetch(&token).await {
            Ok(profile) => profile,
            Err(e) => {
                self.enter(CallbackPhase::FetchFailed);
                return self.fail(e);
            }
        };
        if let Err(e) = self.tokens.verify(&token) {
            self.enter(CallbackPhase::FetchFailed);
            return self.fail(e);
        }
        self.enter(CallbackPhase::ProfileFetched);
        self.tokens.store_user(&profile);
        tracing::info!(user_id = profile.id, roles = %profile.roles, "signed in");

        let redirect = DeferredRedirect {
            history: Arc::clone(&self.history),
            tokens: Arc::clone(&self.tokens),
            resolver: Arc::clone(&self.resolver),
            profile,
            return_url: request.return_url(),
        };

        if redirect.profile.roles.is_content_provider() {
            self.enter(CallbackPhase::AgreementCheck);
            let status =
                check_agreement(self.api.as_ref(), &token, &self.settings.agreement_kind).await;
            if let AgreementStatus::Required(agreement) = status {
                return CallbackOutcome::AgreementRequired(PendingAgreement {
                    gate: AgreementGate::new(agreement),
                    api: Arc::clone(&self.api),
                    token,
                    redirect,
                });
            }
        }

        CallbackOutcome::Redirect(redirect.navigate())
    }

    /// Best-effort timezone update; never awaited by the flow.
    fn spawn_timezone_update(&self, token: &str) {
        let api = Arc::clone(&self.api);
        let token = token.to_owned();
        let timezone = self.settings.timezone.clone();
        tokio::spawn(async move {
            if let Err(e) = api.set_timezone(&token, &timezone).await {
                let err = SessionError::Timezone(e);
                tracing::warn!(err = %err, "timezone update failed");
            }
        });
    }

    fn fail(&mut self, error: SessionError) -> CallbackOutcome<A> {
        self.enter(CallbackPhase::Failed);
        tracing::warn!(err = %error, kind = error.as_str(), "login failed, purging local session");
        self.tokens.purge();
        self.cache.reset();
        self.enter(CallbackPhase::SignedOutRedirect);
        CallbackOutcome::Failed {
            message: error.user_message().to_owned(),
            error,
            delay: self.settings.failure_delay,
            navigation: Navigation::Hard(self.resolver.routes().sign_in()),
        }
    }
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
