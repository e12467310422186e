// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Detection of logouts performed by the sibling deployment.

use std::sync::Arc;

use url::Url;

use crate::redirect::{is_locale_segment, Navigation, SiteRoutes};
use crate::token::TokenStore;

/// Query parameter the sibling app appends after signing out.
pub const LOGGED_OUT_PARAM: &str = "logged_out";
/// Cache-busting parameter on the post-logout destination.
const CACHE_BUST_PARAM: &str = "t";

/// First path segments (after an optional locale) exempt from the strict check.
const PUBLIC_SEGMENTS: &[&str] = &["home", "callback", "signout", "sign-out"];

pub struct LogoutReconciler {
    tokens: Arc<TokenStore>,
    routes: SiteRoutes,
}

impl LogoutReconciler {
    pub fn new(tokens: Arc<TokenStore>, routes: SiteRoutes) -> Self {
        Self { tokens, routes }
    }

    /// Home, callback, and sign-out pages, with or without a locale prefix.
    pub fn is_public_route(&self, path: &str) -> bool {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let rest = match segments.split_first() {
            Some((first, rest)) if is_locale_segment(first, self.routes.locale()) => rest,
            _ => &segments[..],
        };
        match rest.first() {
            None => true,
            Some(first) => PUBLIC_SEGMENTS.contains(first),
        }
    }

    /// Strict check for protected routes: user data left in the fallback
    /// store without the canonical cookie means the sibling app signed out.
    /// Purges local artifacts and returns the sibling sign-out navigation.
    pub fn check_cross_app_logout(&self, path: &str) -> Option<Navigation> {
        if self.is_public_route(path) {
            return None;
        }
        if !self.tokens.has_stored_user() || self.tokens.cookie_token().is_some() {
            return None;
        }
        tracing::info!(path, "session cookie gone, signing out of sibling app");
        self.tokens.purge();
        Some(self.sign_out_navigation())
    }

    /// Hard navigation to the sibling sign-out endpoint.
    pub fn sign_out_navigation(&self) -> Navigation {
        Navigation::Hard(self.sign_out_url(epoch_millis()))
    }

    /// Sibling sign-out URL returning to the locale home, cache-busted with `now_ms`.
    pub fn sign_out_url(&self, now_ms: u128) -> Url {
        let mut home = self.routes.locale_home_url();
        home.query_pairs_mut().append_pair(CACHE_BUST_PARAM, &now_ms.to_string());
        self.routes.sign_out(&home)
    }

    /// Handle the `logged_out` URL signal: purge local artifacts and return
    /// `url` with the parameter stripped. `None` when the signal is absent.
    pub fn apply_logged_out_signal(&self, url: &Url) -> Option<Url> {
        if !url.query_pairs().any(|(key, _)| key == LOGGED_OUT_PARAM) {
            return None;
        }
        tracing::info!("logged_out signal received, purging local session");
        self.tokens.purge();

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != LOGGED_OUT_PARAM)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        let mut stripped = url.clone();
        if kept.is_empty() {
            stripped.set_query(None);
        } else {
            stripped.query_pairs_mut().clear().extend_pairs(kept);
        }
        Some(stripped)
    }
}

fn epoch_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[cfg(test)]
#[path = "logout_tests.rs"]
mod tests;
