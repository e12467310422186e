// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blocking agreement confirmation for content-provider roles.

use crate::api::AuthApi;
use crate::error::{GateError, SessionError};
use crate::profile::Agreement;

/// Result of the latest-agreement lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgreementStatus {
    Accepted,
    Required(Agreement),
}

/// Look up whether the user accepted the latest agreement of `kind`.
///
/// Fails open: any service or decode failure counts as accepted.
pub async fn check_agreement<A: AuthApi + ?Sized>(
    api: &A,
    token: &str,
    kind: &str,
) -> AgreementStatus {
    match api.latest_agreement(token, kind).await {
        Ok(agreement) if agreement.accepted => AgreementStatus::Accepted,
        Ok(agreement) => {
            tracing::debug!(uuid = %agreement.uuid, kind, "agreement not yet accepted");
            AgreementStatus::Required(agreement)
        }
        Err(e) => {
            let err = SessionError::Agreement(e);
            tracing::warn!(err = %err, "agreement check failed, treating as accepted");
            AgreementStatus::Accepted
        }
    }
}

/// Scroll geometry of the agreement content, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub content_height: f64,
    pub viewport_height: f64,
    pub scroll_top: f64,
}

impl Viewport {
    /// Content already fits, or the view is scrolled to the bottom (1px slack).
    pub fn at_end(&self) -> bool {
        self.content_height <= self.viewport_height
            || self.scroll_top + self.viewport_height + 1.0 >= self.content_height
    }
}

/// Agreement awaiting the user's decision.
///
/// Accept stays disabled until the content has been seen in full; once seen,
/// scrolling back up does not disable it again.
#[derive(Debug, Clone)]
pub struct AgreementGate {
    agreement: Agreement,
    viewed: bool,
    last_error: Option<GateError>,
}

impl AgreementGate {
    pub fn new(agreement: Agreement) -> Self {
        Self { agreement, viewed: false, last_error: None }
    }

    pub fn agreement(&self) -> &Agreement {
        &self.agreement
    }

    /// Record the current scroll geometry.
    pub fn observe(&mut self, viewport: Viewport) {
        if !self.viewed && viewport.at_end() {
            tracing::debug!(uuid = %self.agreement.uuid, "agreement fully viewed");
            self.viewed = true;
        }
    }

    pub fn can_accept(&self) -> bool {
        self.viewed
    }

    /// Error from the last failed accept, shown while the gate stays open.
    pub fn last_error(&self) -> Option<&GateError> {
        self.last_error.as_ref()
    }

    /// Record acceptance server-side. On failure the gate stays open with
    /// [`AgreementGate::last_error`] set.
    pub async fn accept<A: AuthApi + ?Sized>(&mut self, api: &A, token: &str) -> Result<(), GateError> {
        if !self.viewed {
            return Err(GateError::NotViewed);
        }
        match api.accept_agreement(token, &self.agreement.uuid).await {
            Ok(()) => {
                tracing::info!(uuid = %self.agreement.uuid, "agreement accepted");
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(uuid = %self.agreement.uuid, err = %e, "agreement accept failed");
                let err = GateError::Api(e);
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[path = "agreement_tests.rs"]
mod tests;
