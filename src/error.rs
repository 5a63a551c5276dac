//! Authentication error taxonomy
//!
//! Token-content failures (`Malformed`, `InvalidSignature`, `ExpiredToken`,
//! `InvalidIssuer`, `InvalidAudience`) are deterministic rejections and map to 401
//! with a generic client message. `Forbidden` (403) is kept distinct so clients can
//! tell "log in" from "you lack permission". `ProviderUnavailable` maps to 503:
//! when the identity provider cannot be reached and a route requires auth, the
//! request fails closed.

use http::StatusCode;
use thiserror::Error;

use crate::principal::Role;

/// Errors produced by token validation and policy enforcement.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token is not structurally a JWT (segments, encoding, header fields).
    #[error("malformed token")]
    Malformed,

    /// Signature did not verify against the provider's current key set.
    #[error("invalid token signature")]
    InvalidSignature,

    /// Token is outside its validity window (`exp`/`nbf`).
    #[error("token expired")]
    ExpiredToken,

    /// `iss` claim does not match the provider's issuer.
    #[error("invalid token issuer")]
    InvalidIssuer,

    /// `aud` claim does not contain any accepted audience.
    #[error("invalid token audience")]
    InvalidAudience,

    /// Key id absent from the key set even after a refresh. Internal to the
    /// key cache; the validator remaps this to `InvalidSignature` so cache-miss
    /// semantics never leak to callers.
    #[error("unknown signing key: {kid}")]
    UnknownKey {
        /// The key id that could not be resolved.
        kid: String,
    },

    /// Identity provider could not be reached and no usable cache exists.
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Credential required but absent or unusable.
    #[error("authentication required")]
    Unauthorized,

    /// Authenticated, but the role hierarchy does not satisfy the route policy.
    #[error("insufficient role, required: {required}")]
    Forbidden {
        /// Minimum role the route requires.
        required: Role,
    },

    /// Invalid configuration detected at construction time.
    #[error("invalid auth configuration: {0}")]
    Configuration(String),
}

impl AuthError {
    /// HTTP status for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Malformed
            | Self::InvalidSignature
            | Self::ExpiredToken
            | Self::InvalidIssuer
            | Self::InvalidAudience
            | Self::UnknownKey { .. }
            | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Token-content failures all collapse to the same
    /// generic text so responses do not reveal which check failed.
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::Malformed
            | Self::InvalidSignature
            | Self::ExpiredToken
            | Self::InvalidIssuer
            | Self::InvalidAudience
            | Self::UnknownKey { .. } => "Invalid token",
            Self::Unauthorized => "Authentication required",
            Self::Forbidden { .. } => "Insufficient permissions",
            Self::ProviderUnavailable(_) => "Authentication service unavailable",
            Self::Configuration(_) => "Authentication misconfigured",
        }
    }

    /// Short machine-readable kind, used in logs and response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::InvalidSignature => "invalid_signature",
            Self::ExpiredToken => "expired_token",
            Self::InvalidIssuer => "invalid_issuer",
            Self::InvalidAudience => "invalid_audience",
            Self::UnknownKey { .. } => "unknown_key",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::Configuration(_) => "configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_content_errors_are_401() {
        for err in [
            AuthError::Malformed,
            AuthError::InvalidSignature,
            AuthError::ExpiredToken,
            AuthError::InvalidIssuer,
            AuthError::InvalidAudience,
            AuthError::Unauthorized,
        ] {
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn forbidden_is_403_and_provider_unavailable_is_503() {
        let forbidden = AuthError::Forbidden {
            required: Role::Admin,
        };
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let unavailable = AuthError::ProviderUnavailable("timeout".into());
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn validation_failures_share_a_generic_message() {
        assert_eq!(
            AuthError::InvalidSignature.client_message(),
            AuthError::ExpiredToken.client_message()
        );
        assert_eq!(
            AuthError::InvalidAudience.client_message(),
            AuthError::Malformed.client_message()
        );
    }
}
