//! Per-route policy enforcement
//!
//! The guard is constructed in one of two modes, fixed for the process
//! lifetime: `Enforce` runs the full validation pipeline; `Bypass` yields a
//! synthetic development principal for every policy. The mode is a
//! construction-time strategy, not a branch inside validation, so the
//! production code path stays auditable independent of dev tooling.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::discovery::DiscoveryCache;
use crate::error::AuthError;
use crate::jwks::KeyCache;
use crate::principal::{Principal, Role};
use crate::validator::TokenValidator;

/// Authorization policy attached to a route at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    /// No authentication; always succeeds with no principal.
    Public,
    /// A valid credential yields a principal; absence is fine; a present but
    /// invalid credential is still an error.
    OptionalAuth,
    /// A valid credential is required.
    RequireAuth,
    /// A valid credential whose highest role is at least the given role.
    RequireRole(Role),
}

#[derive(Debug)]
enum GuardMode {
    Enforce { validator: TokenValidator },
    Bypass { principal: Principal },
}

/// Enforces an [`AuthPolicy`] against a request's Authorization header.
#[derive(Debug)]
pub struct AuthGuard {
    mode: GuardMode,
}

impl AuthGuard {
    /// Build a guard from configuration. Selects `Bypass` only when the
    /// config explicitly enables it, and logs loudly when it does.
    ///
    /// # Errors
    ///
    /// `Configuration` if the HTTP client cannot be constructed.
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        if config.bypass_auth {
            warn!(
                "AUTH BYPASS ENABLED: every request is treated as an admin dev user; \
                 never run production with this flag"
            );
            return Ok(Self {
                mode: GuardMode::Bypass {
                    principal: Principal::dev(),
                },
            });
        }

        let http = http_client(config.http_timeout)?;
        let discovery = DiscoveryCache::new(config, http.clone());
        let keys = KeyCache::new(config, discovery.clone(), http);
        let validator = TokenValidator::new(config, discovery, keys);
        Ok(Self::enforcing(validator))
    }

    /// Build an enforcing guard over an existing validator. Useful when the
    /// caches are shared with other components or mocked in tests.
    pub fn enforcing(validator: TokenValidator) -> Self {
        Self {
            mode: GuardMode::Enforce { validator },
        }
    }

    /// Whether this guard short-circuits to the synthetic dev principal.
    pub fn is_bypass(&self) -> bool {
        matches!(self.mode, GuardMode::Bypass { .. })
    }

    /// Enforce a policy against the raw `Authorization` header value.
    ///
    /// Returns `Ok(None)` only for `Public` routes and `OptionalAuth` routes
    /// with no credential. A principal is never returned unless bypass is
    /// active or the token was cryptographically verified.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for required-but-missing or unusable credentials,
    /// token-content errors for failed validation, `Forbidden` for an
    /// insufficient role, `ProviderUnavailable` when the provider cannot be
    /// reached (fail closed).
    pub async fn enforce(
        &self,
        header: Option<&str>,
        policy: AuthPolicy,
    ) -> Result<Option<Principal>, AuthError> {
        let validator = match &self.mode {
            GuardMode::Bypass { principal } => {
                debug!(policy = ?policy, "auth bypass active, yielding dev principal");
                return Ok(Some(principal.clone()));
            }
            GuardMode::Enforce { validator } => validator,
        };

        if policy == AuthPolicy::Public {
            return Ok(None);
        }

        let Some(header) = header else {
            return match policy {
                AuthPolicy::OptionalAuth => Ok(None),
                _ => Err(AuthError::Unauthorized),
            };
        };

        // Header present: a malformed credential is an error even on
        // optional routes.
        let Some(token) = bearer_token(header) else {
            debug!("authorization header present but not a bearer credential");
            return Err(AuthError::Unauthorized);
        };

        let claims = validator.validate(token).await?;
        let principal = Principal::from_claims(&claims);

        if let AuthPolicy::RequireRole(required) = policy
            && !principal.satisfies(required)
        {
            warn!(
                subject = %principal.id,
                required = %required,
                roles = ?principal.roles,
                "role requirement not met"
            );
            return Err(AuthError::Forbidden { required });
        }

        Ok(Some(principal))
    }
}

/// Extract the token from a `Bearer <token>` header value. Scheme match is
/// case-insensitive per RFC 7235.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {e}")))
}
