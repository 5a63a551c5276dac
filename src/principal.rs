//! Application-facing identity
//!
//! `Principal` is derived per request from validated claims (or synthesized in
//! bypass mode) and never persisted. Roles form a total order `user < admin`;
//! a principal satisfies a role requirement iff its highest role is at least
//! the required one.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::claims::TokenClaims;

/// Application roles, ordered. `User < Admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular user.
    User,
    /// Administrator; satisfies every requirement below it.
    Admin,
}

impl Role {
    /// The role name as it appears in token claims.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse failure for a role string the hierarchy does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// The identity a request acts as.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    /// Provider-side subject id.
    pub id: String,
    /// Email; empty string when the token carries none. Downstream
    /// authorization depends only on id and roles.
    pub email: String,
    /// Preferred username, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Roles recognized by the hierarchy, ordered.
    pub roles: BTreeSet<Role>,
    /// True only for the synthetic principal produced in bypass mode.
    pub is_dev_mode: bool,
}

impl Principal {
    /// Pure mapping from validated claims. Role strings outside the known
    /// hierarchy (Keycloak emits `offline_access`, `uma_authorization`, ...)
    /// are ignored.
    pub fn from_claims(claims: &TokenClaims) -> Self {
        let roles = claims
            .roles()
            .iter()
            .filter_map(|raw| raw.parse().ok())
            .collect();

        Self {
            id: claims.sub.clone(),
            email: claims.email.clone().unwrap_or_default(),
            username: claims.preferred_username.clone(),
            roles,
            is_dev_mode: false,
        }
    }

    /// The fixed synthetic identity used when the auth bypass is active.
    /// Carries the highest role so every policy passes.
    pub fn dev() -> Self {
        Self {
            id: "dev-user".to_string(),
            email: "dev@spending-monitor.local".to_string(),
            username: Some("dev".to_string()),
            roles: BTreeSet::from([Role::User, Role::Admin]),
            is_dev_mode: true,
        }
    }

    /// Highest role this principal holds, if any.
    pub fn highest_role(&self) -> Option<Role> {
        self.roles.iter().next_back().copied()
    }

    /// Whether this principal satisfies `RequireRole(required)` under the
    /// hierarchy: highest role >= required.
    pub fn satisfies(&self, required: Role) -> bool {
        self.highest_role().is_some_and(|role| role >= required)
    }
}
