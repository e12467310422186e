// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for storage, remote calls, and the login flow.

/// Failure reading or writing one of the local storage locations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The cookie jar refused the write (domain mismatch, `SameSite=None`
    /// without `Secure`, or cookies blocked outright).
    #[error("cookie rejected: {0}")]
    CookieRejected(String),
    #[error("storage io: {0}")]
    Io(String),
    #[error("storage document corrupt: {0}")]
    Corrupt(String),
}

/// Failure of a single call to the remote account service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// 401/403: the bearer token is not accepted. Never retried.
    #[error("unauthorized ({status})")]
    Unauthorized { status: u16 },
    #[error("server returned {status}")]
    Server { status: u16 },
    #[error("network: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status },
            _ => Self::Server { status },
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    pub fn is_retryable(&self) -> bool {
        !self.is_auth()
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Decode(e.to_string());
        }
        match e.status() {
            Some(status) => Self::from_status(status.as_u16()),
            None => Self::Network(e.to_string()),
        }
    }
}

/// Errors surfaced by the session layer.
///
/// Only the variants for which [`SessionError::requires_sign_in`] holds are
/// shown to the user (a transient message followed by a forced redirect to
/// sign-in). The rest are logged and absorbed where they occur.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no token in callback URL")]
    MissingToken,
    #[error("session rejected by account service ({status})")]
    Auth { status: u16 },
    /// The token already failed authentication; no request was made.
    #[error("token was previously rejected")]
    TokenBlocked,
    #[error("account service unavailable after {attempts} attempts: {last}")]
    Unavailable { attempts: u32, last: ApiError },
    #[error("token write could not be verified: {0}")]
    Verification(&'static str),
    #[error("agreement service: {0}")]
    Agreement(ApiError),
    #[error("timezone update: {0}")]
    Timezone(ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingToken => "MISSING_TOKEN",
            Self::Auth { .. } => "AUTH",
            Self::TokenBlocked => "TOKEN_BLOCKED",
            Self::Unavailable { .. } => "UNAVAILABLE",
            Self::Verification(_) => "VERIFICATION",
            Self::Agreement(_) => "AGREEMENT",
            Self::Timezone(_) => "TIMEZONE",
            Self::Storage(_) => "STORAGE",
        }
    }

    /// True for failures that end the login attempt: local state is purged
    /// and the user is sent back to sign-in.
    pub fn requires_sign_in(&self) -> bool {
        matches!(
            self,
            Self::MissingToken
                | Self::Auth { .. }
                | Self::TokenBlocked
                | Self::Unavailable { .. }
                | Self::Verification(_)
        )
    }

    /// True for authentication failures (as opposed to availability).
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::TokenBlocked)
    }

    /// Short message shown while the failure redirect is pending.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Auth { .. } | Self::TokenBlocked => "Your session has expired. Please sign in again.",
            Self::Unavailable { .. } => "We could not load your account. Please sign in again.",
            _ => "Sign-in could not be completed. Please try again.",
        }
    }
}

/// Errors raised by the agreement gate's accept action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("agreement must be read to the end before accepting")]
    NotViewed,
    #[error("could not record acceptance: {0}")]
    Api(ApiError),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
