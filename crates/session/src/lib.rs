// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sessionbridge: bearer-token session reconciliation across two
//! cooperating web origins.
//!
//! A login arrives as an identity-redirect URL ([`callback`]); the token is
//! persisted in a shared-domain cookie plus a local fallback ([`token`]), the
//! profile is fetched through a coalescing cache ([`cache`]), an agreement
//! gate may pause the flow ([`agreement`]), and the final destination is
//! chosen by [`redirect`]. In the background, [`poller`] and [`logout`]
//! reconcile local state with logouts performed by the sibling deployment.
//! [`session::SessionService`] owns all of it.

pub mod agreement;
pub mod api;
pub mod cache;
pub mod callback;
pub mod command;
pub mod config;
pub mod cookies;
pub mod error;
pub mod events;
pub mod logout;
pub mod poller;
pub mod profile;
pub mod redirect;
pub mod retry;
pub mod role;
pub mod session;
pub mod storage;
pub mod test_support;
pub mod token;

use std::sync::Once;

pub use crate::config::BridgeConfig;
pub use crate::error::{ApiError, SessionError};
pub use crate::redirect::Navigation;
pub use crate::session::SessionService;

static CRYPTO: Once = Once::new();

/// Install the rustls crypto provider (needed for reqwest even on plain HTTP).
pub fn ensure_crypto() {
    CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
