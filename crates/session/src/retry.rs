// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Profile fetch with bounded retries and exponential backoff.

use std::time::Duration;

use crate::api::AuthApi;
use crate::error::{ApiError, SessionError};
use crate::profile::Profile;

/// Attempt cap and initial delay; the delay doubles after each failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, given `attempt` failures so far.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.initial_backoff.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Fetch the profile, retrying retryable failures.
///
/// 401/403 return [`SessionError::Auth`] immediately. Any other failure is
/// retried until the cap, then returned as [`SessionError::Unavailable`].
pub async fn fetch_profile_with_retry<A: AuthApi + ?Sized>(
    api: &A,
    token: &str,
    policy: RetryPolicy,
) -> Result<Profile, SessionError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match api.fetch_profile(token).await {
            Ok(profile) => return Ok(profile),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff_after(attempt);
                tracing::debug!(attempt, err = %e, ?delay, "profile fetch failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(ApiError::Unauthorized { status }) => {
                tracing::debug!(attempt, status, "profile fetch rejected");
                return Err(SessionError::Auth { status });
            }
            Err(e) => {
                return Err(SessionError::Unavailable { attempts: attempt, last: e });
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
