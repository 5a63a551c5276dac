//! axum integration
//!
//! Binds the guard to the HTTP layer: `AuthState` is the shared state routers
//! carry, `AuthError` renders as an HTTP response (401 with a
//! `WWW-Authenticate: Bearer` challenge, 403, or 503), and one extractor per
//! policy mirrors the FastAPI-style dependencies of the original API:
//! [`CurrentUser`], [`MaybeUser`], [`RequireUser`], [`RequireAdmin`].
//!
//! Response bodies stay generic on purpose; which validation check failed is
//! logged server-side, never returned to the caller.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::request::Parts;
use serde_json::json;
use tracing::warn;

use crate::error::AuthError;
use crate::guard::{AuthGuard, AuthPolicy};
use crate::principal::{Principal, Role};

/// Shared auth state for an axum router.
#[derive(Debug, Clone)]
pub struct AuthState {
    guard: Arc<AuthGuard>,
}

impl AuthState {
    /// Wrap a constructed guard for use as router state.
    pub fn new(guard: AuthGuard) -> Self {
        Self {
            guard: Arc::new(guard),
        }
    }

    /// The underlying guard.
    pub fn guard(&self) -> &AuthGuard {
        &self.guard
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match status {
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::FORBIDDEN => "forbidden",
            StatusCode::SERVICE_UNAVAILABLE => "service_unavailable",
            _ => "internal_error",
        };
        let body = json!({
            "error": error,
            "error_description": self.client_message(),
        });

        let mut response = (status, axum::Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, http::HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Run the guard for a request, record the outcome, and stash a validated
/// principal in the request extensions for inner handlers.
async fn enforce(
    parts: &mut Parts,
    state: &AuthState,
    policy: AuthPolicy,
) -> Result<Option<Principal>, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match state.guard.enforce(header, policy).await {
        Ok(principal) => {
            if let Some(principal) = &principal {
                parts.extensions.insert(principal.clone());
            }
            Ok(principal)
        }
        Err(err) => {
            warn!(
                path = %parts.uri.path(),
                kind = err.kind(),
                "request rejected by auth guard"
            );
            Err(err)
        }
    }
}

/// Requires a valid credential; rejects with 401 otherwise.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

impl<S> FromRequestParts<S> for CurrentUser
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AuthState::from_ref(state);
        let principal = enforce(parts, &state, AuthPolicy::RequireAuth)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        Ok(Self(principal))
    }
}

/// Optional authentication: `None` when no credential was sent, `Some` when a
/// valid one was. A present-but-invalid credential still rejects with 401.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Principal>);

impl<S> FromRequestParts<S> for MaybeUser
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AuthState::from_ref(state);
        let principal = enforce(parts, &state, AuthPolicy::OptionalAuth).await?;
        Ok(Self(principal))
    }
}

/// Requires the `user` role or higher.
#[derive(Debug, Clone)]
pub struct RequireUser(pub Principal);

impl<S> FromRequestParts<S> for RequireUser
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AuthState::from_ref(state);
        let principal = enforce(parts, &state, AuthPolicy::RequireRole(Role::User))
            .await?
            .ok_or(AuthError::Unauthorized)?;
        Ok(Self(principal))
    }
}

/// Requires the `admin` role.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub Principal);

impl<S> FromRequestParts<S> for RequireAdmin
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AuthState::from_ref(state);
        let principal = enforce(parts, &state, AuthPolicy::RequireRole(Role::Admin))
            .await?
            .ok_or(AuthError::Unauthorized)?;
        Ok(Self(principal))
    }
}
