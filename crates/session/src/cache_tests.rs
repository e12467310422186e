// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::error::ApiError;
use crate::role::Role;
use crate::test_support::{profile, FakeApi};

fn cache_over(api: &Arc<FakeApi>) -> ProfileCache<FakeApi> {
    ProfileCache::new(Arc::clone(api), DEFAULT_FRESHNESS, RetryPolicy::default())
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_request() -> anyhow::Result<()> {
    let api = Arc::new(FakeApi::returning(profile(1, &[Role::Client], Some(1))).gated());
    let cache = cache_over(&api);

    let (a, b, ()) = tokio::join!(cache.get(Some("tok"), false), cache.get(Some("tok"), false), async {
        tokio::task::yield_now().await;
        api.release(1);
    });

    assert_eq!(a?.map(|p| p.id), Some(1));
    assert_eq!(b?.map(|p| p.id), Some(1));
    assert_eq!(api.profile_calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn different_token_waits_for_in_flight_fetch() -> anyhow::Result<()> {
    let api = Arc::new(FakeApi::returning(profile(2, &[Role::Insighter], Some(4))).gated());
    let cache = cache_over(&api);

    let (a, b, ()) = tokio::join!(cache.fetch("first"), cache.fetch("second"), async {
        tokio::task::yield_now().await;
        assert_eq!(api.profile_calls(), 1);
        api.release(2);
    });

    a?;
    b?;
    assert_eq!(api.profile_calls(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn fresh_profile_is_served_without_request() -> anyhow::Result<()> {
    let api = Arc::new(FakeApi::returning(profile(3, &[Role::Company], Some(9))));
    let cache = cache_over(&api);

    cache.get(Some("tok"), false).await?;
    cache.get(Some("tok"), false).await?;
    assert_eq!(api.profile_calls(), 1);

    tokio::time::advance(DEFAULT_FRESHNESS + Duration::from_secs(1)).await;
    cache.get(Some("tok"), false).await?;
    assert_eq!(api.profile_calls(), 2);

    cache.get(Some("tok"), true).await?;
    assert_eq!(api.profile_calls(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn admin_profile_is_never_cached() -> anyhow::Result<()> {
    let api = Arc::new(FakeApi::returning(profile(4, &[Role::Admin], None)));
    let cache = cache_over(&api);

    let first = cache.get(Some("tok"), false).await?;
    assert!(first.is_some_and(|p| p.roles.is_admin()));
    assert!(!cache.has_profile());

    cache.get(Some("tok"), false).await?;
    assert_eq!(api.profile_calls(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn auth_failure_opens_breaker() {
    let api = Arc::new(FakeApi::failing(ApiError::Unauthorized { status: 401 }));
    let cache = cache_over(&api);

    assert_eq!(cache.get(Some("tok"), false).await, Err(SessionError::Auth { status: 401 }));
    assert!(cache.is_tripped("tok"));

    assert_eq!(cache.get(Some("tok"), false).await, Ok(None));
    assert_eq!(cache.get(Some("tok"), true).await, Ok(None));
    assert_eq!(cache.fetch("tok").await, Err(SessionError::TokenBlocked));
    assert_eq!(api.profile_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn new_token_clears_breaker() -> anyhow::Result<()> {
    let api = Arc::new(FakeApi::returning(profile(5, &[Role::Client], Some(2))));
    api.push_profile(Err(ApiError::Unauthorized { status: 401 }));
    let cache = cache_over(&api);

    assert!(cache.get(Some("stale"), false).await.is_err());
    assert!(cache.is_tripped("stale"));

    let fetched = cache.get(Some("fresh"), false).await?;
    assert_eq!(fetched.map(|p| p.id), Some(5));
    assert!(!cache.is_tripped("stale"));
    assert_eq!(api.profile_calls(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn missing_token_clears_breaker_and_profile() -> anyhow::Result<()> {
    let api = Arc::new(FakeApi::failing(ApiError::Unauthorized { status: 403 }));
    let cache = cache_over(&api);
    let _ = cache.get(Some("tok"), false).await;
    assert!(cache.is_tripped("tok"));

    assert_eq!(cache.get(None, true).await?, None);
    assert!(!cache.is_tripped("tok"));
    assert!(!cache.has_profile());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_failures_recover_within_attempts() -> anyhow::Result<()> {
    let api = Arc::new(FakeApi::returning(profile(6, &[Role::Client], Some(3))));
    api.push_profile(Err(ApiError::Server { status: 500 }));
    api.push_profile(Err(ApiError::Server { status: 500 }));
    let cache = cache_over(&api);

    let fetched = cache.get(Some("tok"), false).await?;
    assert_eq!(fetched.map(|p| p.id), Some(6));
    assert_eq!(api.profile_calls(), 3);
    assert!(cache.has_profile());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_serve_stale_profile() -> anyhow::Result<()> {
    let api = Arc::new(FakeApi::returning(profile(7, &[Role::Client], Some(3))));
    let cache = cache_over(&api);
    cache.get(Some("tok"), false).await?;

    api.set_profile(Err(ApiError::Server { status: 503 }));
    tokio::time::advance(DEFAULT_FRESHNESS * 2).await;

    let stale = cache.get(Some("tok"), false).await?;
    assert_eq!(stale.map(|p| p.id), Some(7));
    assert_eq!(api.profile_calls(), 4);
    assert!(!cache.is_tripped("tok"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_without_cache_yield_none() -> anyhow::Result<()> {
    let api = Arc::new(FakeApi::failing(ApiError::Network("refused".into())));
    let cache = cache_over(&api);
    assert_eq!(cache.get(Some("tok"), false).await?, None);
    assert!(matches!(cache.fetch("tok").await, Err(SessionError::Unavailable { attempts: 3, .. })));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reset_discards_in_flight_result() -> anyhow::Result<()> {
    let api = Arc::new(FakeApi::returning(profile(8, &[Role::Client], Some(1))).gated());
    let cache = cache_over(&api);

    let (result, ()) = tokio::join!(cache.get(Some("tok"), false), async {
        tokio::task::yield_now().await;
        cache.reset();
        api.release(1);
    });

    assert_eq!(result?.map(|p| p.id), Some(8));
    assert!(!cache.has_profile());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn invalidate_keeps_breaker() {
    let api = Arc::new(FakeApi::failing(ApiError::Unauthorized { status: 401 }));
    let cache = cache_over(&api);
    let _ = cache.get(Some("tok"), false).await;

    cache.invalidate();
    assert!(cache.is_tripped("tok"));
    cache.clear_breaker();
    assert!(!cache.is_tripped("tok"));
}
