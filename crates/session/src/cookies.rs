// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host-dependent cookie scoping shared by every auth cookie.

use std::net::IpAddr;

use cookie::{Cookie, SameSite};
use time::Duration;

use crate::storage::host_without_port;

/// Session cookie carrying the bearer token.
pub const SESSION_COOKIE: &str = "token";
/// Short-lived cookie carrying a pending return-url.
pub const RETURN_URL_COOKIE: &str = "return_url";

pub const SESSION_MAX_AGE: Duration = Duration::days(7);
pub const RETURN_URL_MAX_AGE: Duration = Duration::hours(1);

/// How auth cookies are scoped for the current host.
///
/// Removal cookies are built from the same policy as the cookie they remove;
/// a removal with a different domain/path combination would not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookiePolicy {
    /// Loopback development host: host-only, `SameSite=Lax`.
    Loopback,
    /// Shared with the sibling deployment: `Domain=.<domain>; SameSite=None; Secure`.
    Shared { domain: String },
}

impl CookiePolicy {
    /// Pick the policy for `host` (which may carry a port). `cookie_domain`
    /// overrides the derived root domain.
    pub fn for_host(host: &str, cookie_domain: Option<&str>) -> Self {
        let host = host_without_port(host);
        if is_loopback(&host) {
            return Self::Loopback;
        }
        let domain = match cookie_domain {
            Some(d) if !d.trim().is_empty() => d.trim().trim_start_matches('.').to_ascii_lowercase(),
            _ => root_domain(&host),
        };
        Self::Shared { domain }
    }

    /// Build a cookie scoped by this policy.
    pub fn build(&self, name: &str, value: &str, max_age: Duration) -> Cookie<'static> {
        let builder = Cookie::build((name.to_owned(), value.to_owned())).path("/").max_age(max_age);
        match self {
            Self::Loopback => builder.same_site(SameSite::Lax).build(),
            Self::Shared { domain } => builder
                .domain(format!(".{domain}"))
                .same_site(SameSite::None)
                .secure(true)
                .build(),
        }
    }

    /// Build the removal for a cookie previously written with this policy.
    pub fn removal(&self, name: &str) -> Cookie<'static> {
        self.build(name, "", Duration::seconds(-1))
    }

    pub fn session_cookie(&self, token: &str) -> Cookie<'static> {
        self.build(SESSION_COOKIE, token, SESSION_MAX_AGE)
    }

    pub fn return_url_cookie(&self, url: &str) -> Cookie<'static> {
        self.build(RETURN_URL_COOKIE, url, RETURN_URL_MAX_AGE)
    }
}

/// `localhost`, `*.localhost`, or a loopback IP literal.
pub fn is_loopback(host: &str) -> bool {
    let host = host_without_port(host);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }
    host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Last two labels of a hostname; IP literals and single labels are returned as-is.
fn root_domain(host: &str) -> String {
    if host.parse::<IpAddr>().is_ok() {
        return host.to_owned();
    }
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    match labels.len() {
        0 | 1 => host.to_owned(),
        n => labels[n - 2..].join("."),
    }
}

#[cfg(test)]
#[path = "cookies_tests.rs"]
mod tests;
