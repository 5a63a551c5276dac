//! JWT validation against the live provider key set
//!
//! Checks run in a fixed order and short-circuit on the first failure:
//! structural parse, header (RS256 only, `kid` required), key resolution,
//! signature, `exp`/`nbf` with clock-skew allowance, issuer equality against
//! the current discovery document, audience intersection, then role extraction.
//! Key-cache misses surface as `InvalidSignature` so internal cache semantics
//! never leak to callers. The `none` algorithm is never honored.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, TokenData, Validation, decode, decode_header};
use tracing::{debug, warn};

use crate::claims::TokenClaims;
use crate::config::AuthConfig;
use crate::discovery::DiscoveryCache;
use crate::error::AuthError;
use crate::jwks::KeyCache;

/// Validates bearer tokens issued by the configured provider.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    accepted_audiences: Vec<String>,
    clock_skew: Duration,
    discovery: DiscoveryCache,
    keys: KeyCache,
}

impl TokenValidator {
    /// Build a validator over the shared discovery and key caches.
    pub fn new(config: &AuthConfig, discovery: DiscoveryCache, keys: KeyCache) -> Self {
        Self {
            accepted_audiences: config.accepted_audiences.clone(),
            clock_skew: config.clock_skew,
            discovery,
            keys,
        }
    }

    /// Validate a raw token and return its claims.
    ///
    /// # Errors
    ///
    /// `Malformed`, `InvalidSignature`, `ExpiredToken`, `InvalidIssuer`,
    /// `InvalidAudience` for deterministic rejections; `ProviderUnavailable`
    /// when discovery or the key set cannot be fetched.
    pub async fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        if !has_jwt_shape(token) {
            return Err(AuthError::Malformed);
        }

        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "token header did not parse");
            AuthError::Malformed
        })?;

        if header.alg != Algorithm::RS256 {
            warn!(algorithm = ?header.alg, "token signed with unsupported algorithm");
            return Err(AuthError::InvalidSignature);
        }

        let kid = header.kid.ok_or(AuthError::Malformed)?;

        let key = self.keys.get_key(&kid).await.map_err(|err| match err {
            AuthError::UnknownKey { kid } => {
                warn!(kid, "token references a key absent from the current set");
                AuthError::InvalidSignature
            }
            other => other,
        })?;

        // Signature only; exp/nbf/iss/aud are checked manually below so each
        // failure maps to its own error kind.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data: TokenData<TokenClaims> =
            decode(token, &key, &validation).map_err(|e| map_decode_error(&e))?;
        let claims = data.claims;

        let now = unix_now();
        let skew = self.clock_skew.as_secs();

        let exp = claims.exp.ok_or(AuthError::Malformed)?;
        if exp + skew <= now {
            return Err(AuthError::ExpiredToken);
        }
        if let Some(nbf) = claims.nbf
            && nbf > now + skew
        {
            return Err(AuthError::ExpiredToken);
        }

        let issuer = self.discovery.get_metadata().await?.issuer.clone();
        if claims.iss.as_deref() != Some(issuer.as_str()) {
            warn!(
                expected = %issuer,
                got = claims.iss.as_deref().unwrap_or("<absent>"),
                "token issuer mismatch"
            );
            return Err(AuthError::InvalidIssuer);
        }

        // Keycloak public clients may omit aud entirely; when present it must
        // intersect the accepted set.
        if let Some(aud) = &claims.aud
            && !aud.intersects(&self.accepted_audiences)
        {
            warn!(subject = %claims.sub, "token audience not accepted");
            return Err(AuthError::InvalidAudience);
        }

        debug!(
            subject = %claims.sub,
            roles = ?claims.roles(),
            "token validated"
        );
        Ok(claims)
    }
}

/// Three non-empty base64url segments. Anything else is not a JWT.
fn has_jwt_shape(token: &str) -> bool {
    let mut segments = 0;
    for segment in token.split('.') {
        segments += 1;
        if segment.is_empty() || segments > 3 {
            return false;
        }
    }
    segments == 3
}

fn map_decode_error(err: &jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) | ErrorKind::InvalidToken => {
            AuthError::Malformed
        }
        // InvalidSignature, algorithm confusion, crypto-layer failures: all
        // collapse to a signature rejection.
        _ => AuthError::InvalidSignature,
    }
}

fn unix_now() -> u64 {
    // Pre-epoch clocks only happen on badly misconfigured hosts; treating it
    // as zero makes every token look expired, which fails closed.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
