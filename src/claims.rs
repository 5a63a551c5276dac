//! Validated token claims
//!
//! `TokenClaims` is only ever produced by the validator from a token whose
//! signature has been verified; it is never deserialized from untrusted input
//! directly. Role extraction from the Keycloak-style `realm_access.roles` claim
//! fails closed to an empty set, since role absence is a valid state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The `aud` claim: a single audience string or an array of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// `"aud": "spending-monitor"`
    One(String),
    /// `"aud": ["spending-monitor", "account"]`
    Many(Vec<String>),
}

impl Audience {
    /// Whether any audience value matches one of the accepted strings.
    pub fn intersects(&self, accepted: &[String]) -> bool {
        match self {
            Self::One(aud) => accepted.iter().any(|a| a == aud),
            Self::Many(auds) => auds.iter().any(|aud| accepted.iter().any(|a| a == aud)),
        }
    }
}

/// Keycloak realm-level role container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealmAccess {
    /// Role names granted at the realm level.
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Claims carried by a validated access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the provider-side user id.
    pub sub: String,
    /// Issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience(s).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    /// Expiry, seconds since epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    /// Not-before, seconds since epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    /// Issued-at, seconds since epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    /// Email, when the `email` scope was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Preferred username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    /// Realm-level roles. Tolerates a malformed claim by dropping it: role
    /// absence is a valid state and must not reject an otherwise valid token.
    #[serde(
        default,
        deserialize_with = "lenient_realm_access",
        skip_serializing_if = "Option::is_none"
    )]
    pub realm_access: Option<RealmAccess>,
    /// Everything else the provider put in the token, passed through untouched.
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl TokenClaims {
    /// Role strings from `realm_access.roles`; empty when the claim path is
    /// missing or malformed.
    pub fn roles(&self) -> &[String] {
        self.realm_access
            .as_ref()
            .map(|ra| ra.roles.as_slice())
            .unwrap_or(&[])
    }
}

fn lenient_realm_access<'de, D>(deserializer: D) -> Result<Option<RealmAccess>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}
