//! # spendmon-auth
//!
//! OIDC authentication and role-based authorization for the spending-monitor
//! API. Validates bearer tokens issued by a Keycloak-style OpenID Connect
//! provider and enforces per-route role policies, without ever implementing an
//! identity provider or a login flow itself.
//!
//! ## Architecture
//!
//! - [`config`] - configuration, environment loading, the bypass switch
//! - [`discovery`] - OIDC discovery document cache (TTL + single-flight +
//!   stale-while-revalidate)
//! - [`jwks`] - signing key set cache (whole-set refresh, miss-triggered
//!   refetch, on-access TTL)
//! - [`validator`] - JWT validation: signature, expiry, issuer, audience
//! - [`claims`] / [`principal`] - validated claims and the per-request identity
//!   derived from them
//! - [`guard`] - policy enforcement (`Public` / `OptionalAuth` / `RequireAuth`
//!   / `RequireRole`), with the dev bypass as a construction-time strategy
//! - [`middleware`] - axum state, extractors, and error responses
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use spendmon_auth::{AuthConfig, AuthGuard, AuthState, CurrentUser, RequireAdmin};
//!
//! # fn main() -> Result<(), spendmon_auth::AuthError> {
//! let config = AuthConfig::from_env()?;
//! let state = AuthState::new(AuthGuard::new(&config)?);
//!
//! let app: Router = Router::new()
//!     .route("/profile", get(|CurrentUser(user): CurrentUser| async move {
//!         format!("hello {}", user.username.as_deref().unwrap_or("user"))
//!     }))
//!     .route("/admin", get(|RequireAdmin(admin): RequireAdmin| async move {
//!         format!("admin {}", admin.id)
//!     }))
//!     .with_state(state);
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure semantics
//!
//! Token-content failures are deterministic 401s with a generic body. An
//! insufficient role is a 403 so clients can tell "log in" from "you lack
//! permission". An unreachable identity provider on a protected route is a
//! 503: the guard fails closed, never open.

pub mod claims;
pub mod config;
pub mod discovery;
pub mod error;
pub mod guard;
pub mod jwks;
pub mod middleware;
pub mod principal;
pub mod validator;

pub use claims::{Audience, RealmAccess, TokenClaims};
pub use config::AuthConfig;
pub use discovery::{DiscoveryCache, ProviderMetadata};
pub use error::AuthError;
pub use guard::{AuthGuard, AuthPolicy};
pub use jwks::KeyCache;
pub use middleware::{AuthState, CurrentUser, MaybeUser, RequireAdmin, RequireUser};
pub use principal::{Principal, Role};
pub use validator::TokenValidator;
