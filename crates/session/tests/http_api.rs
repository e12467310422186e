// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `HttpAuthApi` against a local axum server standing in for the account
//! service.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use url::Url;

use sessionbridge::api::{AuthApi, HttpAuthApi};
use sessionbridge::cache::ProfileCache;
use sessionbridge::retry::RetryPolicy;
use sessionbridge::role::Role;
use sessionbridge::{ApiError, SessionError};

/// Request seen by the fake server.
#[derive(Debug, Clone)]
struct Seen {
    route: String,
    authorization: Option<String>,
    language: Option<String>,
    timezone: Option<String>,
    body: Option<Value>,
}

#[derive(Default)]
struct Service {
    seen: Mutex<Vec<Seen>>,
    /// Statuses returned by the profile endpoint before it succeeds.
    profile_failures: Mutex<Vec<u16>>,
    profile_calls: AtomicU32,
    wrap: bool,
}

impl Service {
    fn record(&self, route: impl Into<String>, headers: &HeaderMap, body: Option<Value>) {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);
        self.seen.lock().push(Seen {
            route: route.into(),
            authorization: header("authorization"),
            language: header("accept-language"),
            timezone: header("x-timezone"),
            body,
        });
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }
}

async fn profile(State(svc): State<Arc<Service>>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    svc.profile_calls.fetch_add(1, Ordering::SeqCst);
    svc.record("profile", &headers, None);
    let failure = {
        let mut failures = svc.profile_failures.lock();
        if failures.is_empty() {
            None
        } else {
            Some(failures.remove(0))
        }
    };
    if let Some(status) = failure {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, Json(json!({ "message": "nope" })));
    }
    let body = json!({
        "id": 42,
        "name": "Ada",
        "email": "ada@example.com",
        "roles": ["insighter", "moderator"],
        "country_id": 7,
    });
    if svc.wrap {
        (StatusCode::OK, Json(json!({ "data": body })))
    } else {
        (StatusCode::OK, Json(body))
    }
}

async fn timezone(State(svc): State<Arc<Service>>, headers: HeaderMap, Json(body): Json<Value>) -> StatusCode {
    svc.record("timezone", &headers, Some(body));
    StatusCode::OK
}

async fn latest(
    State(svc): State<Arc<Service>>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> Json<Value> {
    svc.record(format!("latest/{kind}"), &headers, None);
    Json(json!({ "data": { "uuid": "agr-1", "accept": false, "type": kind, "title": "Terms" } }))
}

async fn accept(State(svc): State<Arc<Service>>, Path(uuid): Path<String>, headers: HeaderMap) -> StatusCode {
    svc.record(format!("accept/{uuid}"), &headers, None);
    StatusCode::NO_CONTENT
}

async fn serve(svc: Arc<Service>) -> SocketAddr {
    let app = Router::new()
        .route("/api/account/profile", get(profile))
        .route("/api/account/timezone/set", post(timezone))
        .route("/api/common/setting/agreement/latest/{kind}", get(latest))
        .route("/api/common/setting/agreement/accept/{uuid}", put(accept))
        .with_state(svc);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}

fn client(addr: SocketAddr) -> HttpAuthApi {
    let base = Url::parse(&format!("http://{addr}")).unwrap();
    HttpAuthApi::new(base, "ar", "Asia/Riyadh")
}

#[tokio::test]
async fn profile_request_carries_session_headers() {
    let svc = Arc::new(Service { wrap: true, ..Default::default() });
    let api = client(serve(Arc::clone(&svc)).await);

    let profile = api.fetch_profile("tok-1").await.unwrap();
    assert_eq!(profile.id, 42);
    assert!(profile.roles.contains(Role::Insighter));
    assert!(profile.is_complete());

    let seen = svc.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].authorization.as_deref(), Some("Bearer tok-1"));
    assert_eq!(seen[0].language.as_deref(), Some("ar"));
    assert_eq!(seen[0].timezone.as_deref(), Some("Asia/Riyadh"));
}

#[tokio::test]
async fn bare_profile_body_is_accepted() {
    let svc = Arc::new(Service::default());
    let api = client(serve(svc).await);
    let profile = api.fetch_profile("tok").await.unwrap();
    assert_eq!(profile.email, "ada@example.com");
}

#[tokio::test]
async fn status_codes_are_classified() {
    let svc = Arc::new(Service::default());
    svc.profile_failures.lock().extend([401, 403, 500]);
    let api = client(serve(svc).await);

    assert_eq!(api.fetch_profile("tok").await, Err(ApiError::Unauthorized { status: 401 }));
    assert_eq!(api.fetch_profile("tok").await, Err(ApiError::Unauthorized { status: 403 }));
    assert_eq!(api.fetch_profile("tok").await, Err(ApiError::Server { status: 500 }));
}

#[tokio::test]
async fn unreachable_service_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = client(addr).fetch_profile("tok").await;
    assert!(matches!(result, Err(ApiError::Network(_))), "got {result:?}");
}

#[tokio::test]
async fn timezone_and_agreement_endpoints() {
    let svc = Arc::new(Service::default());
    let api = client(serve(Arc::clone(&svc)).await);

    api.set_timezone("tok", "Europe/Berlin").await.unwrap();
    let agreement = api.latest_agreement("tok", "insighter-agreement").await.unwrap();
    assert_eq!(agreement.uuid, "agr-1");
    assert!(!agreement.accepted);
    assert_eq!(agreement.kind.as_deref(), Some("insighter-agreement"));
    api.accept_agreement("tok", &agreement.uuid).await.unwrap();

    let routes: Vec<String> = svc.seen().into_iter().map(|s| s.route).collect();
    assert_eq!(routes, ["timezone", "latest/insighter-agreement", "accept/agr-1"]);
    assert_eq!(svc.seen()[0].body, Some(json!({ "timezone": "Europe/Berlin" })));
}

#[tokio::test]
async fn cache_retries_transient_failures_over_http() {
    let svc = Arc::new(Service { wrap: true, ..Default::default() });
    svc.profile_failures.lock().extend([502, 503]);
    let api = Arc::new(client(serve(Arc::clone(&svc)).await));
    let policy = RetryPolicy { max_attempts: 3, initial_backoff: Duration::from_millis(5) };
    let cache = ProfileCache::new(api, Duration::from_secs(300), policy);

    let profile = cache.get(Some("tok"), false).await.unwrap();
    assert_eq!(profile.map(|p| p.id), Some(42));
    assert_eq!(svc.profile_calls.load(Ordering::SeqCst), 3);

    // Served from cache.
    cache.get(Some("tok"), false).await.unwrap();
    assert_eq!(svc.profile_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn rejected_token_trips_breaker_over_http() {
    let svc = Arc::new(Service::default());
    svc.profile_failures.lock().push(401);
    let api = Arc::new(client(serve(Arc::clone(&svc)).await));
    let cache = ProfileCache::new(api, Duration::from_secs(300), RetryPolicy::default());

    assert_eq!(cache.get(Some("tok"), false).await, Err(SessionError::Auth { status: 401 }));
    assert!(cache.is_tripped("tok"));
    assert_eq!(cache.fetch("tok").await, Err(SessionError::TokenBlocked));
    assert_eq!(svc.profile_calls.load(Ordering::SeqCst), 1);
}
