// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use cookie::{Cookie, SameSite};
use time::Duration;

use super::*;

fn shared(name: &str, value: &str, max_age: Duration) -> Cookie<'static> {
    Cookie::build((name.to_owned(), value.to_owned()))
        .path("/")
        .domain("example.com")
        .secure(true)
        .same_site(SameSite::None)
        .max_age(max_age)
        .build()
}

fn host_only(name: &str, value: &str, max_age: Duration) -> Cookie<'static> {
    Cookie::build((name.to_owned(), value.to_owned()))
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

// ── host parsing ──────────────────────────────────────────────────────

#[yare::parameterized(
    plain = { "example.com", "example.com" },
    with_port = { "localhost:3000", "localhost" },
    ipv4_port = { "127.0.0.1:8080", "127.0.0.1" },
    ipv6_bracketed = { "[::1]:3000", "::1" },
    ipv6_bare = { "::1", "::1" },
    upper = { "WWW.Example.COM", "www.example.com" },
)]
fn strips_port(raw: &str, expected: &str) {
    assert_eq!(host_without_port(raw), expected);
}

#[yare::parameterized(
    exact = { "example.com", "example.com", true },
    subdomain = { "app.example.com", "example.com", true },
    suffix_only = { "badexample.com", "example.com", false },
    parent = { "example.com", "app.example.com", false },
    ip = { "10.0.0.1", "0.0.1", false },
)]
fn domain_match(host: &str, domain: &str, expected: bool) {
    assert_eq!(domain_matches(host, domain), expected);
}

// ── cookie table ──────────────────────────────────────────────────────

#[test]
fn shared_cookie_visible_to_sibling_subdomain() -> anyhow::Result<()> {
    let site = MemoryCookieJar::new("www.example.com");
    let app = site.for_host("app.example.com");
    site.set(shared("token", "t1", Duration::days(7)))?;
    assert_eq!(app.get("token").as_deref(), Some("t1"));
    Ok(())
}

#[test]
fn host_only_cookie_hidden_from_sibling() -> anyhow::Result<()> {
    let site = MemoryCookieJar::new("www.example.com");
    let app = site.for_host("app.example.com");
    site.set(host_only("token", "t1", Duration::days(7)))?;
    assert_eq!(site.get("token").as_deref(), Some("t1"));
    assert!(app.get("token").is_none());
    Ok(())
}

#[test]
fn removal_with_other_domain_leaves_cookie() -> anyhow::Result<()> {
    let jar = MemoryCookieJar::new("www.example.com");
    jar.set(shared("token", "t1", Duration::days(7)))?;
    // Host-only removal does not match the shared-domain cookie.
    jar.set(host_only("token", "", Duration::seconds(-1)))?;
    assert_eq!(jar.get("token").as_deref(), Some("t1"));

    jar.set(shared("token", "", Duration::seconds(-1)))?;
    assert!(jar.get("token").is_none());
    Ok(())
}

#[test]
fn domain_outside_host_is_rejected() {
    let jar = MemoryCookieJar::new("localhost");
    let result = jar.set(shared("token", "t1", Duration::days(7)));
    assert!(matches!(result, Err(StorageError::CookieRejected(_))));
    assert!(jar.get("token").is_none());
}

#[test]
fn same_site_none_requires_secure() {
    let jar = MemoryCookieJar::new("www.example.com");
    let cookie = Cookie::build(("token", "t1")).domain("example.com").same_site(SameSite::None).build();
    assert!(jar.set(cookie).is_err());
}

#[test]
fn blocked_jar_rejects_writes() {
    let jar = MemoryCookieJar::new("localhost");
    jar.set_blocked(true);
    assert!(jar.set(host_only("token", "t1", Duration::days(7))).is_err());
}

#[test]
fn expired_entries_are_invisible() {
    let mut table = CookieTable::default();
    let cookie = host_only("return_url", "/x", Duration::hours(1));
    assert!(table.apply("localhost", &cookie, 1_000).is_ok());
    assert!(table.lookup("localhost", "return_url", 1_000 + 3_599).is_some());
    assert!(table.lookup("localhost", "return_url", 1_000 + 3_600).is_none());
}

#[test]
fn longest_path_wins() {
    let mut table = CookieTable::default();
    let root = host_only("token", "root", Duration::days(1));
    let nested = Cookie::build(("token", "nested")).path("/en").max_age(Duration::days(1)).build();
    assert!(table.apply("localhost", &root, 0).is_ok());
    assert!(table.apply("localhost", &nested, 0).is_ok());
    assert_eq!(table.lookup("localhost", "token", 1).map(|c| c.value.as_str()), Some("nested"));
}

// ── file-backed stores ────────────────────────────────────────────────

#[test]
fn file_jar_persists_across_instances() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cookies.json");
    FileCookieJar::new("localhost", &path).set(host_only("token", "t1", Duration::days(7)))?;

    let reopened = FileCookieJar::new("localhost", &path);
    assert_eq!(reopened.get("token").as_deref(), Some("t1"));

    reopened.set(host_only("token", "", Duration::seconds(-1)))?;
    assert!(FileCookieJar::new("localhost", &path).get("token").is_none());
    Ok(())
}

#[test]
fn file_local_store_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("local.json");
    let store = FileLocalStore::new(&path);
    assert!(store.get(TOKEN_KEY).is_none());

    store.set(TOKEN_KEY, "t1")?;
    store.set(USER_KEY, "{}")?;
    assert_eq!(FileLocalStore::new(&path).get(TOKEN_KEY).as_deref(), Some("t1"));

    store.remove(TOKEN_KEY);
    let reopened = FileLocalStore::new(&path);
    assert!(reopened.get(TOKEN_KEY).is_none());
    assert_eq!(reopened.get(USER_KEY).as_deref(), Some("{}"));
    Ok(())
}

#[test]
fn corrupt_local_store_reads_empty() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("local.json");
    std::fs::write(&path, "not json")?;
    assert!(FileLocalStore::new(&path).get(TOKEN_KEY).is_none());
    Ok(())
}
