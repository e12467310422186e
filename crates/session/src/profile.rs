// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types returned by the account service.

use serde::{Deserialize, Serialize};

use crate::role::RoleSet;

/// Authenticated user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub roles: RoleSet,
    /// Absent until the user completes their profile.
    #[serde(default)]
    pub country_id: Option<i64>,
    #[serde(default, rename = "profile_photo_url", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Fields this layer does not interpret, kept for round-tripping.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Profile {
    pub fn is_complete(&self) -> bool {
        self.country_id.is_some()
    }
}

/// Latest version of a legal agreement and whether the caller accepted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agreement {
    pub uuid: String,
    #[serde(rename = "accept")]
    pub accepted: bool,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, alias = "body", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<String>,
}

/// Response body that is either bare or wrapped in `{ "data": ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } => data,
            Self::Bare(value) => value,
        }
    }
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;
