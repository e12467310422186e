// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use url::Url;

use crate::cookies::CookiePolicy;
use crate::redirect::SiteRoutes;
use crate::retry::RetryPolicy;

/// Configuration for the session bridge.
#[derive(Debug, Clone, clap::Args)]
pub struct BridgeConfig {
    /// Host of the current origin (may carry a port). Picks the cookie policy.
    #[arg(long, default_value = "localhost", env = "SESSIONBRIDGE_HOST")]
    pub host: String,

    /// Shared cookie domain. Defaults to the last two labels of the host.
    #[arg(long, env = "SESSIONBRIDGE_COOKIE_DOMAIN")]
    pub cookie_domain: Option<String>,

    /// Base URL of the account service API.
    #[arg(long, default_value = "http://localhost:8000", env = "SESSIONBRIDGE_API_URL")]
    pub api_url: String,

    /// Origin of the current (marketing) site.
    #[arg(long, default_value = "http://localhost:3000", env = "SESSIONBRIDGE_SITE_ORIGIN")]
    pub site_origin: String,

    /// Origin of the sibling application deployment.
    #[arg(long, default_value = "http://localhost:3001", env = "SESSIONBRIDGE_APP_ORIGIN")]
    pub app_origin: String,

    /// Path prefix every sibling application route lives under.
    #[arg(long, default_value = "/app", env = "SESSIONBRIDGE_APP_ROOT")]
    pub app_root: String,

    /// Locale for the `Accept-Language` header and locale-scoped routes.
    #[arg(long, default_value = "en", env = "SESSIONBRIDGE_LOCALE")]
    pub locale: String,

    /// IANA timezone reported to the account service.
    #[arg(long, default_value = "UTC", env = "SESSIONBRIDGE_TIMEZONE")]
    pub timezone: String,

    /// Agreement type checked for content-provider roles.
    #[arg(long, default_value = "insighter-agreement", env = "SESSIONBRIDGE_AGREEMENT_TYPE")]
    pub agreement_type: String,

    /// Session poll interval in milliseconds.
    #[arg(long, default_value_t = 5000, env = "SESSIONBRIDGE_POLL_MS")]
    pub poll_ms: u64,

    /// Profile freshness window in seconds.
    #[arg(long, default_value_t = 300, env = "SESSIONBRIDGE_FRESHNESS_SECS")]
    pub freshness_secs: u64,

    /// Profile fetch attempts, including the first.
    #[arg(long, default_value_t = 3, env = "SESSIONBRIDGE_MAX_ATTEMPTS")]
    pub max_attempts: u32,

    /// Initial retry backoff in milliseconds; doubles per retry.
    #[arg(long, default_value_t = 1000, env = "SESSIONBRIDGE_BACKOFF_MS")]
    pub backoff_ms: u64,

    /// Delay before the sign-in redirect after a failed login, in milliseconds.
    #[arg(long, default_value_t = 2000, env = "SESSIONBRIDGE_FAILURE_REDIRECT_MS")]
    pub failure_redirect_ms: u64,

    /// Directory holding the cookie jar and local store.
    #[arg(long, env = "SESSIONBRIDGE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

impl BridgeConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_ms == 0 {
            anyhow::bail!("--poll-ms must be greater than zero");
        }
        if self.max_attempts == 0 {
            anyhow::bail!("--max-attempts must be at least 1");
        }
        self.api_base()?;
        self.routes()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    pub fn failure_delay(&self) -> Duration {
        Duration::from_millis(self.failure_redirect_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.backoff_ms),
        }
    }

    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy::for_host(&self.host, self.cookie_domain.as_deref())
    }

    pub fn api_base(&self) -> anyhow::Result<Url> {
        Url::parse(&self.api_url).with_context(|| format!("invalid api url: {}", self.api_url))
    }

    pub fn routes(&self) -> anyhow::Result<SiteRoutes> {
        let site = Url::parse(&self.site_origin)
            .with_context(|| format!("invalid site origin: {}", self.site_origin))?;
        let app = Url::parse(&self.app_origin)
            .with_context(|| format!("invalid app origin: {}", self.app_origin))?;
        Ok(SiteRoutes::new(site, app, &self.app_root, &self.locale))
    }

    /// Resolve the state directory.
    ///
    /// Uses `--state-dir` / `SESSIONBRIDGE_STATE_DIR`, then
    /// `$XDG_STATE_HOME/sessionbridge`, then `$HOME/.local/state/sessionbridge`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("sessionbridge");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/sessionbridge");
        }
        PathBuf::from(".sessionbridge")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
