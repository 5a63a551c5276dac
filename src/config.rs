//! Authentication configuration
//!
//! All knobs for the auth subsystem live here: provider location, accepted
//! audiences, cache TTLs, HTTP timeouts, and the development bypass switch.
//! Configuration is read once at startup and never mutated afterwards.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::AuthError;

/// Environment variable enabling the development auth bypass.
pub const BYPASS_AUTH_ENV: &str = "BYPASS_AUTH";

/// Environment variable mirroring the UI's bypass flag. A mismatch between the
/// two is a deployment error: the UI and API would disagree about whether
/// requests carry real tokens. It is surfaced in logs, never reconciled.
pub const UI_BYPASS_AUTH_ENV: &str = "UI_BYPASS_AUTH";

/// Authentication configuration.
///
/// Defaults match the local Keycloak development setup of the spending-monitor
/// stack: realm and client id `spending-monitor`, issuer under
/// `http://localhost:8080/realms/spending-monitor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Issuer URL, including the realm path. The discovery document is fetched
    /// from `{issuer_url}/.well-known/openid-configuration`.
    pub issuer_url: String,
    /// OAuth client id of this API; the primary expected audience.
    pub client_id: String,
    /// Audiences accepted in the `aud` claim. Keycloak access tokens for public
    /// clients commonly carry `account` in addition to the client id.
    pub accepted_audiences: Vec<String>,
    /// How long a fetched discovery document stays fresh.
    pub discovery_ttl: Duration,
    /// Grace window after `discovery_ttl` during which a stale document may
    /// still be served if a refresh fails (stale-while-revalidate).
    pub discovery_grace: Duration,
    /// How long a fetched key set stays fresh. Bounds exposure to revoked keys.
    pub jwks_ttl: Duration,
    /// Minimum interval between key-set refreshes. Rate-limits refetches so a
    /// flood of unknown key ids cannot hammer the provider.
    ///
    /// Within this window a lookup miss is answered from the unchanged cached
    /// set, so a token signed with a key rotated in moments after a fetch is
    /// rejected until the window lapses. Shorten the interval if rotation
    /// pickup matters more than provider load.
    pub min_refresh_interval: Duration,
    /// Timeout applied to discovery and JWKS fetches, independent of any
    /// request-level timeout.
    pub http_timeout: Duration,
    /// Clock-skew allowance for `exp`/`nbf` checks.
    pub clock_skew: Duration,
    /// Development bypass: the guard skips validation entirely and yields a
    /// synthetic admin principal. Must never be enabled implicitly.
    pub bypass_auth: bool,
    /// When discovery is unreachable, synthesize provider endpoints from the
    /// issuer URL using Keycloak's well-known path layout. Endpoint URLs only;
    /// signing keys still require a reachable JWKS endpoint, so protected
    /// routes remain fail-closed.
    pub endpoint_fallback: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer_url: "http://localhost:8080/realms/spending-monitor".to_string(),
            client_id: "spending-monitor".to_string(),
            accepted_audiences: vec!["spending-monitor".to_string(), "account".to_string()],
            discovery_ttl: Duration::from_secs(3600),
            discovery_grace: Duration::from_secs(6 * 3600),
            jwks_ttl: Duration::from_secs(600),
            min_refresh_interval: Duration::from_secs(5),
            http_timeout: Duration::from_secs(5),
            clock_skew: Duration::from_secs(30),
            bypass_auth: false,
            endpoint_fallback: false,
        }
    }
}

impl AuthConfig {
    /// Build a config for the given issuer and client id. The client id and
    /// Keycloak's stock `account` audience are accepted.
    pub fn new(issuer_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        Self {
            issuer_url: issuer_url.into(),
            accepted_audiences: vec![client_id.clone(), "account".to_string()],
            client_id,
            ..Self::default()
        }
    }

    /// Load configuration from process environment variables.
    ///
    /// Recognized: `AUTH_ISSUER_URL`, `AUTH_CLIENT_ID`, `BYPASS_AUTH`,
    /// `UI_BYPASS_AUTH`, `AUTH_ENDPOINT_FALLBACK`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the issuer URL does not parse.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup. `from_env` is
    /// this with `std::env::var`; tests inject maps instead.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let mut config = Self::default();

        if let Some(issuer) = lookup("AUTH_ISSUER_URL") {
            config.issuer_url = issuer;
        }
        if let Some(client_id) = lookup("AUTH_CLIENT_ID") {
            config.accepted_audiences = vec![client_id.clone(), "account".to_string()];
            config.client_id = client_id;
        }
        if let Some(raw) = lookup(BYPASS_AUTH_ENV) {
            config.bypass_auth = parse_bool(&raw);
        }
        if let Some(raw) = lookup("AUTH_ENDPOINT_FALLBACK") {
            config.endpoint_fallback = parse_bool(&raw);
        }

        // UI and API bypass flags must agree. A divergence means one side is
        // enforcing auth while the other skips it, which only manifests as
        // confusing authentication-state mismatches downstream.
        if let Some(raw) = lookup(UI_BYPASS_AUTH_ENV) {
            let ui_bypass = parse_bool(&raw);
            if ui_bypass != config.bypass_auth {
                error!(
                    api_bypass = config.bypass_auth,
                    ui_bypass,
                    "auth bypass flags diverge between UI and API; fix the deployment"
                );
            }
        }

        url::Url::parse(&config.issuer_url)
            .map_err(|e| AuthError::Configuration(format!("invalid issuer URL: {e}")))?;

        Ok(config)
    }

    /// The OIDC discovery URL for the configured issuer.
    pub fn discovery_url(&self) -> String {
        format!(
            "{}/.well-known/openid-configuration",
            self.issuer_url.trim_end_matches('/')
        )
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
