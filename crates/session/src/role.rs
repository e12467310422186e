// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Closed role vocabulary shared with the account service.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A role the account service can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Platform administrator. Never cached, always sent to the admin console.
    Admin,
    Insighter,
    Company,
    CompanyInsighter,
    Client,
}

impl Role {
    /// Roles that publish content and must accept the provider agreement.
    pub const CONTENT_PROVIDERS: [Role; 3] = [Role::Insighter, Role::Company, Role::CompanyInsighter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Insighter => "insighter",
            Self::Company => "company",
            Self::CompanyInsighter => "company-insighter",
            Self::Client => "client",
        }
    }

    pub fn is_content_provider(self) -> bool {
        Self::CONTENT_PROVIDERS.contains(&self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "insighter" => Ok(Self::Insighter),
            "company" => Ok(Self::Company),
            "company-insighter" | "company_insighter" => Ok(Self::CompanyInsighter),
            "client" => Ok(Self::Client),
            other => anyhow::bail!("unknown role: {other}"),
        }
    }
}

/// The set of roles held by a profile.
///
/// Serialized as the server's list of role strings. Strings outside the
/// known vocabulary are dropped on parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn intersects(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.0.contains(r))
    }

    pub fn is_admin(&self) -> bool {
        self.contains(Role::Admin)
    }

    pub fn is_content_provider(&self) -> bool {
        self.intersects(&Role::CONTENT_PROVIDERS)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<String>> for RoleSet {
    fn from(raw: Vec<String>) -> Self {
        raw.iter()
            .filter_map(|s| match s.parse::<Role>() {
                Ok(role) => Some(role),
                Err(e) => {
                    tracing::debug!(err = %e, "ignoring role");
                    None
                }
            })
            .collect()
    }
}

impl From<RoleSet> for Vec<String> {
    fn from(set: RoleSet) -> Self {
        set.iter().map(|r| r.as_str().to_owned()).collect()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|r| r.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

#[cfg(test)]
#[path = "role_tests.rs"]
mod tests;
