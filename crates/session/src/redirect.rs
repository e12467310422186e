// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-login destination resolution across the site and the sibling app.
//!
//! Precedence, first match wins:
//! 1. admin role: the sibling admin console;
//! 2. incomplete profile: the complete-profile page, carrying the
//!    destination steps 3-4 would pick;
//! 3. a non-trivial return-url (query, then the short-lived cookie);
//! 4. role default: the sibling dashboard for content providers, else the
//!    locale home.

use std::fmt;

use url::form_urlencoded;
use url::Url;

use crate::profile::Profile;
use crate::role::RoleSet;
use crate::token::TokenStore;

/// Path prefixes owned by the sibling deployment, relative to its app root.
pub const SIBLING_PREFIXES: &[&str] = &[
    "/account",
    "/profile",
    "/insighter-dashboard",
    "/knowledge/detail",
    "/knowledge/edit",
    "/knowledge/review",
];

/// Path segments that mark a return-url as an auth detour.
const AUTH_SEGMENTS: &[&str] =
    &["login", "signin", "sign-in", "auth", "callback", "logout", "signout", "sign-out"];

/// A navigation the embedding page should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Client-side route on the current origin; in-memory state survives.
    Route(String),
    /// Full page load.
    Hard(Url),
}

impl Navigation {
    pub fn target(&self) -> String {
        match self {
            Self::Route(path) => path.clone(),
            Self::Hard(url) => url.to_string(),
        }
    }

    pub fn is_hard(&self) -> bool {
        matches!(self, Self::Hard(_))
    }
}

impl fmt::Display for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Route(path) => write!(f, "route {path}"),
            Self::Hard(url) => write!(f, "navigate {url}"),
        }
    }
}

/// Where a return-url points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnTarget {
    Local(String),
    Sibling(Url),
    External(Url),
}

impl From<ReturnTarget> for Navigation {
    fn from(target: ReturnTarget) -> Self {
        match target {
            ReturnTarget::Local(path) => Self::Route(path),
            ReturnTarget::Sibling(url) | ReturnTarget::External(url) => Self::Hard(url),
        }
    }
}

/// Fixed routes of both deployments.
#[derive(Debug, Clone)]
pub struct SiteRoutes {
    site: Url,
    app: Url,
    app_root: String,
    locale: String,
}

impl SiteRoutes {
    pub fn new(site: Url, app: Url, app_root: &str, locale: &str) -> Self {
        let trimmed = app_root.trim().trim_matches('/');
        let app_root = if trimmed.is_empty() { String::new() } else { format!("/{trimmed}") };
        Self { site, app, app_root, locale: locale.to_owned() }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn app_root(&self) -> &str {
        &self.app_root
    }

    pub fn home_path(&self) -> String {
        format!("/{}/home", self.locale)
    }

    pub fn complete_profile_path(&self) -> String {
        format!("/{}/complete-profile", self.locale)
    }

    /// Absolute URL of a site path.
    pub fn site_url(&self, path: &str) -> Url {
        join_or_base(&self.site, path)
    }

    pub fn locale_home_url(&self) -> Url {
        self.site_url(&self.home_path())
    }

    /// `path` prefixed with the app root unless it already carries it.
    pub fn with_app_root(&self, path: &str) -> String {
        let path = if path.starts_with('/') { path.to_owned() } else { format!("/{path}") };
        if self.app_root.is_empty() || strip_root(&path, &self.app_root).is_some() {
            path
        } else {
            format!("{}{path}", self.app_root)
        }
    }

    /// Absolute sibling URL for `path` (which may carry a query).
    pub fn app_url(&self, path: &str) -> Url {
        join_or_base(&self.app, &self.with_app_root(path))
    }

    pub fn admin_console(&self) -> Url {
        self.app_url("/admin/dashboard")
    }

    pub fn default_dashboard(&self) -> Url {
        self.app_url("/insighter-dashboard/my-dashboard")
    }

    pub fn sign_in(&self) -> Url {
        self.app_url("/auth/login")
    }

    /// Sibling sign-out endpoint, returning to `redirect_uri` afterwards.
    pub fn sign_out(&self, redirect_uri: &Url) -> Url {
        let mut url = self.app_url("/auth/logout");
        url.query_pairs_mut().append_pair("redirect_uri", redirect_uri.as_str());
        url
    }

    /// True for values that carry no usable destination: home, bare
    /// locale, an auth/login path, or a protocol-relative reference.
    pub fn is_trivial(&self, value: &str) -> bool {
        let value = value.trim();
        if is_protocol_relative(value) {
            return true;
        }
        let path = match Url::parse(value) {
            Ok(url) => url.path().to_owned(),
            Err(_) => path_part(value).to_owned(),
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.iter().any(|s| AUTH_SEGMENTS.contains(&s.to_ascii_lowercase().as_str())) {
            return true;
        }
        let rest = match segments.split_first() {
            Some((first, rest)) if is_locale_segment(first, &self.locale) => rest,
            _ => &segments[..],
        };
        matches!(rest, [] | ["home"])
    }

    /// Classify a non-trivial return-url.
    pub fn classify(&self, value: &str) -> ReturnTarget {
        let value = value.trim();
        if let Ok(url) = Url::parse(value) {
            if matches!(url.scheme(), "http" | "https") {
                return ReturnTarget::External(url);
            }
        }
        // Collapsed to one slash so `//host/...` can never leave the origin.
        let value = format!("/{}", value.trim_start_matches(['/', '\\']));
        let path = path_part(&value);
        let relative = strip_root(path, &self.app_root).unwrap_or(path);
        let relative = if relative.is_empty() { "/" } else { relative };
        if SIBLING_PREFIXES.iter().any(|prefix| has_prefix(relative, prefix)) {
            ReturnTarget::Sibling(self.app_url(&value))
        } else {
            ReturnTarget::Local(value)
        }
    }
}

fn join_or_base(base: &Url, path: &str) -> Url {
    match base.join(path) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(%base, path, err = %e, "could not join url");
            base.clone()
        }
    }
}

/// `//host/...` (or a backslash variant browsers treat the same way).
fn is_protocol_relative(value: &str) -> bool {
    let mut chars = value.chars();
    matches!((chars.next(), chars.next()), (Some('/' | '\\'), Some('/' | '\\')))
}

/// Path portion of a relative reference (before `?` or `#`).
fn path_part(value: &str) -> &str {
    value.split(['?', '#']).next().unwrap_or_default()
}

fn has_prefix(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix).is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// `path` with the app root removed, if it starts with it.
fn strip_root<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    if root.is_empty() {
        return None;
    }
    path.strip_prefix(root).filter(|rest| rest.is_empty() || rest.starts_with(['/', '?', '#']))
}

/// The configured locale, or any two-letter lowercase segment.
pub(crate) fn is_locale_segment(segment: &str, locale: &str) -> bool {
    segment.eq_ignore_ascii_case(locale)
        || (segment.len() == 2 && segment.chars().all(|c| c.is_ascii_lowercase()))
}

/// Outcome of a pure resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Navigate(Navigation),
    /// Profile is incomplete: go to `route`, which carries `pending` as its
    /// `redirect` parameter.
    CompleteProfile { route: String, pending: Navigation },
}

/// Decides where a freshly authenticated user goes next.
#[derive(Debug, Clone)]
pub struct RedirectResolver {
    routes: SiteRoutes,
}

impl RedirectResolver {
    pub fn new(routes: SiteRoutes) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &SiteRoutes {
        &self.routes
    }

    /// Pure decision over the profile and the best available return-url.
    pub fn resolve(&self, profile: &Profile, return_url: Option<&str>) -> Resolution {
        if profile.roles.is_admin() {
            return Resolution::Navigate(Navigation::Hard(self.routes.admin_console()));
        }
        let destination = self.destination(&profile.roles, return_url);
        if profile.is_complete() {
            return Resolution::Navigate(destination);
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("redirect", &destination.target())
            .finish();
        Resolution::CompleteProfile {
            route: format!("{}?{query}", self.routes.complete_profile_path()),
            pending: destination,
        }
    }

    /// Destination ignoring the admin and completeness gates.
    pub fn destination(&self, roles: &RoleSet, return_url: Option<&str>) -> Navigation {
        if let Some(value) = return_url.filter(|v| !self.routes.is_trivial(v)) {
            return self.routes.classify(value).into();
        }
        if roles.is_content_provider() {
            Navigation::Hard(self.routes.default_dashboard())
        } else {
            Navigation::Route(self.routes.home_path())
        }
    }

    /// Resolve against stored state and apply its side effects.
    ///
    /// The return-url cookie is deleted before the navigation is returned,
    /// whether or not its value was used. Admins never read it. An incomplete
    /// profile persists the pending destination for the complete-profile page.
    pub fn resolve_and_commit(
        &self,
        tokens: &TokenStore,
        profile: &Profile,
        query_return: Option<&str>,
    ) -> Navigation {
        if profile.roles.is_admin() {
            return Navigation::Hard(self.routes.admin_console());
        }
        let candidate = match query_return.map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => {
                tokens.discard_return_url_cookie();
                Some(query.to_owned())
            }
            None => tokens.take_return_url(),
        };
        match self.resolve(profile, candidate.as_deref()) {
            Resolution::Navigate(navigation) => navigation,
            Resolution::CompleteProfile { route, pending } => {
                tracing::debug!(pending = %pending.target(), "profile incomplete");
                tokens.save_pending_return(&pending.target());
                Navigation::Route(route)
            }
        }
    }
}

#[cfg(test)]
#[path = "redirect_tests.rs"]
mod tests;
