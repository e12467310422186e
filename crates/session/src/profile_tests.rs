// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::role::Role;

#[test]
fn profile_from_wrapped_body() -> anyhow::Result<()> {
    let body = r#"{"data":{"id":7,"name":"Ada","email":"ada@example.com","roles":["insighter"],
        "country_id":12,"profile_photo_url":"https://cdn.example.com/a.png","bio":"hi"}}"#;
    let profile = serde_json::from_str::<Envelope<Profile>>(body)?.into_inner();
    assert_eq!(profile.id, 7);
    assert!(profile.roles.contains(Role::Insighter));
    assert!(profile.is_complete());
    assert_eq!(profile.photo_url.as_deref(), Some("https://cdn.example.com/a.png"));
    assert_eq!(profile.extra["bio"], "hi");
    Ok(())
}

#[test]
fn profile_from_bare_body_without_country() -> anyhow::Result<()> {
    let body = r#"{"id":9,"name":"Bo","email":"bo@example.com","roles":["client"],"country_id":null}"#;
    let profile = serde_json::from_str::<Envelope<Profile>>(body)?.into_inner();
    assert_eq!(profile.id, 9);
    assert!(!profile.is_complete());
    Ok(())
}

#[test]
fn agreement_requires_accept_flag() {
    let body = r#"{"data":{"uuid":"u-1"}}"#;
    assert!(serde_json::from_str::<Envelope<Agreement>>(body).is_err());
}

#[test]
fn agreement_reads_body_alias() -> anyhow::Result<()> {
    let body = r#"{"data":{"uuid":"u-1","accept":false,"type":"insighter-agreement","body":"Terms"}}"#;
    let agreement = serde_json::from_str::<Envelope<Agreement>>(body)?.into_inner();
    assert!(!agreement.accepted);
    assert_eq!(agreement.content.as_deref(), Some("Terms"));
    assert_eq!(agreement.kind.as_deref(), Some("insighter-agreement"));
    Ok(())
}
