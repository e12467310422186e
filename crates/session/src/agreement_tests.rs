// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::Ordering;

use super::*;
use crate::error::ApiError;
use crate::role::Role;
use crate::test_support::{agreement, profile, FakeApi};

fn api() -> FakeApi {
    FakeApi::returning(profile(1, &[Role::Insighter], Some(1)))
}

fn viewport(content_height: f64, viewport_height: f64, scroll_top: f64) -> Viewport {
    Viewport { content_height, viewport_height, scroll_top }
}

#[yare::parameterized(
    fits = { 300.0, 400.0, 0.0, true },
    exact_fit = { 400.0, 400.0, 0.0, true },
    top = { 1200.0, 400.0, 0.0, false },
    middle = { 1200.0, 400.0, 500.0, false },
    bottom = { 1200.0, 400.0, 800.0, true },
    subpixel_short = { 1200.0, 400.0, 799.5, true },
    two_px_short = { 1200.0, 400.0, 798.0, false },
)]
fn viewport_at_end(content: f64, view: f64, scroll: f64, expected: bool) {
    assert_eq!(viewport(content, view, scroll).at_end(), expected);
}

#[tokio::test]
async fn accepted_agreement_passes() {
    let api = api();
    assert_eq!(check_agreement(&api, "tok", "insighter-agreement").await, AgreementStatus::Accepted);
    assert_eq!(api.agreement_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unaccepted_agreement_is_required() {
    let api = api();
    api.set_agreement(Ok(agreement("agr-2", false)));
    assert_eq!(
        check_agreement(&api, "tok", "insighter-agreement").await,
        AgreementStatus::Required(agreement("agr-2", false))
    );
}

#[tokio::test]
async fn agreement_service_failure_fails_open() {
    for error in [
        ApiError::Server { status: 500 },
        ApiError::Unauthorized { status: 401 },
        ApiError::Decode("expected value".into()),
    ] {
        let api = api();
        api.set_agreement(Err(error.clone()));
        assert_eq!(
            check_agreement(&api, "tok", "insighter-agreement").await,
            AgreementStatus::Accepted,
            "{error}"
        );
    }
}

#[tokio::test]
async fn accept_requires_full_view() {
    let api = api();
    let mut gate = AgreementGate::new(agreement("agr-3", false));
    gate.observe(viewport(2000.0, 500.0, 100.0));
    assert!(!gate.can_accept());
    assert_eq!(gate.accept(&api, "tok").await, Err(GateError::NotViewed));
    assert_eq!(api.accept_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn viewed_latch_survives_scrolling_back() {
    let mut gate = AgreementGate::new(agreement("agr-4", false));
    gate.observe(viewport(2000.0, 500.0, 1500.0));
    gate.observe(viewport(2000.0, 500.0, 0.0));
    assert!(gate.can_accept());
}

#[tokio::test]
async fn failed_accept_keeps_gate_open() {
    let api = api();
    api.push_accept(Err(ApiError::Network("timed out".into())));
    let mut gate = AgreementGate::new(agreement("agr-5", false));
    gate.observe(viewport(100.0, 500.0, 0.0));

    let err = gate.accept(&api, "tok").await;
    assert_eq!(err, Err(GateError::Api(ApiError::Network("timed out".into()))));
    assert!(gate.last_error().is_some());
    assert!(gate.can_accept());

    assert_eq!(gate.accept(&api, "tok").await, Ok(()));
    assert!(gate.last_error().is_none());
    assert_eq!(api.accept_calls.load(Ordering::SeqCst), 2);
}
