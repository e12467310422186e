// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scripted account service, profile
//! builders, and in-memory stores.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::api::AuthApi;
use crate::config::BridgeConfig;
use crate::cookies::CookiePolicy;
use crate::error::ApiError;
use crate::profile::{Agreement, Profile};
use crate::role::{Role, RoleSet};
use crate::storage::{MemoryCookieJar, MemoryLocalStore};
use crate::token::TokenStore;

/// Build a profile with the given roles and country.
pub fn profile(id: i64, roles: &[Role], country_id: Option<i64>) -> Profile {
    Profile {
        id,
        name: format!("user-{id}"),
        email: format!("user-{id}@example.com"),
        roles: roles.iter().copied().collect::<RoleSet>(),
        country_id,
        photo_url: None,
        extra: serde_json::Map::new(),
    }
}

pub fn agreement(uuid: &str, accepted: bool) -> Agreement {
    Agreement {
        uuid: uuid.to_owned(),
        accepted,
        kind: Some("insighter-agreement".to_owned()),
        title: Some("Insighter Agreement".to_owned()),
        content: Some("Terms of participation.".to_owned()),
        effective_date: Some("2026-01-01".to_owned()),
    }
}

#[derive(Parser)]
struct ConfigArgs {
    #[command(flatten)]
    config: BridgeConfig,
}

/// Config with defaults, overridden by `args` (e.g. `["--host", "www.example.com"]`).
pub fn config(args: &[&str]) -> BridgeConfig {
    let argv = std::iter::once("sessionbridge").chain(args.iter().copied());
    ConfigArgs::parse_from(argv).config
}

/// In-memory stores for `host` and a token store over them.
pub struct MemoryStores {
    pub cookies: Arc<MemoryCookieJar>,
    pub local: Arc<MemoryLocalStore>,
    pub tokens: Arc<TokenStore>,
}

impl MemoryStores {
    pub fn new(host: &str) -> Self {
        let cookies = Arc::new(MemoryCookieJar::new(host));
        let local = Arc::new(MemoryLocalStore::new());
        let policy = CookiePolicy::for_host(host, None);
        let tokens = Arc::new(TokenStore::new(cookies.clone(), local.clone(), policy));
        Self { cookies, local, tokens }
    }
}

/// Scripted [`AuthApi`] with call counters.
///
/// Profile responses are consumed from a queue; when it is empty the
/// fallback response is used. A gated fake holds every profile fetch until
/// [`FakeApi::release`] grants a permit.
pub struct FakeApi {
    profiles: Mutex<VecDeque<Result<Profile, ApiError>>>,
    fallback_profile: Mutex<Result<Profile, ApiError>>,
    agreement: Mutex<Result<Agreement, ApiError>>,
    accept: Mutex<VecDeque<Result<(), ApiError>>>,
    timezone: Mutex<Result<(), ApiError>>,
    gate: Option<Semaphore>,
    pub profile_calls: AtomicU32,
    pub timezone_calls: AtomicU32,
    pub agreement_calls: AtomicU32,
    pub accept_calls: AtomicU32,
}

impl FakeApi {
    pub fn new(fallback: Result<Profile, ApiError>) -> Self {
        Self {
            profiles: Mutex::new(VecDeque::new()),
            fallback_profile: Mutex::new(fallback),
            agreement: Mutex::new(Ok(agreement("agr-1", true))),
            accept: Mutex::new(VecDeque::new()),
            timezone: Mutex::new(Ok(())),
            gate: None,
            profile_calls: AtomicU32::new(0),
            timezone_calls: AtomicU32::new(0),
            agreement_calls: AtomicU32::new(0),
            accept_calls: AtomicU32::new(0),
        }
    }

    pub fn returning(profile: Profile) -> Self {
        Self::new(Ok(profile))
    }

    pub fn failing(error: ApiError) -> Self {
        Self::new(Err(error))
    }

    /// Hold profile fetches until released.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self, permits: usize) {
        if let Some(ref gate) = self.gate {
            gate.add_permits(permits);
        }
    }

    /// Queue a one-shot profile response ahead of the fallback.
    pub fn push_profile(&self, result: Result<Profile, ApiError>) {
        self.profiles.lock().push_back(result);
    }

    pub fn set_profile(&self, result: Result<Profile, ApiError>) {
        *self.fallback_profile.lock() = result;
    }

    pub fn set_agreement(&self, result: Result<Agreement, ApiError>) {
        *self.agreement.lock() = result;
    }

    /// Queue a one-shot accept response; accepts succeed once the queue is empty.
    pub fn push_accept(&self, result: Result<(), ApiError>) {
        self.accept.lock().push_back(result);
    }

    pub fn set_timezone_result(&self, result: Result<(), ApiError>) {
        *self.timezone.lock() = result;
    }

    pub fn profile_calls(&self) -> u32 {
        self.profile_calls.load(Ordering::SeqCst)
    }
}

impl AuthApi for FakeApi {
    async fn fetch_profile(&self, _token: &str) -> Result<Profile, ApiError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref gate) = self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        let queued = self.profiles.lock().pop_front();
        match queued {
            Some(result) => result,
            None => self.fallback_profile.lock().clone(),
        }
    }

    async fn set_timezone(&self, _token: &str, _timezone: &str) -> Result<(), ApiError> {
        self.timezone_calls.fetch_add(1, Ordering::SeqCst);
        self.timezone.lock().clone()
    }

    async fn latest_agreement(&self, _token: &str, _kind: &str) -> Result<Agreement, ApiError> {
        self.agreement_calls.fetch_add(1, Ordering::SeqCst);
        self.agreement.lock().clone()
    }

    async fn accept_agreement(&self, _token: &str, _uuid: &str) -> Result<(), ApiError> {
        self.accept_calls.fetch_add(1, Ordering::SeqCst);
        self.accept.lock().pop_front().unwrap_or(Ok(()))
    }
}
