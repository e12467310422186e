// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle events broadcast by the service.

use serde::{Deserialize, Serialize};

/// Broadcast whenever local session state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A callback completed sign-in.
    SignedIn { user_id: i64 },
    /// The poller loaded the profile for a stored token.
    ProfileLoaded { user_id: i64 },
    /// The token disappeared while a profile was cached.
    SignedOutElsewhere,
    /// The account service rejected the stored token; local state was purged.
    TokenRejected,
    /// Confirmed cross-app logout; the page must navigate to `target`.
    ForcedSignOut { target: String },
    /// The `logged_out` URL signal was applied.
    LoggedOutSignal,
}
