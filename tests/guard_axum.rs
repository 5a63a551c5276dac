//! End-to-end guard behavior through an axum router: policy extractors,
//! status codes, the 401 challenge header, and the development bypass.

mod common;

use axum::Router;
use axum::body::Body;
use axum::routing::get;
use common::{MockProvider, TestKey, claims_for};
use http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use spendmon_auth::{AuthGuard, AuthState, CurrentUser, MaybeUser, RequireAdmin, RequireUser};

async fn health() -> &'static str {
    "ok"
}

async fn me(CurrentUser(principal): CurrentUser) -> String {
    principal.id
}

async fn feed(MaybeUser(principal): MaybeUser) -> String {
    match principal {
        Some(principal) => format!("personalized:{}", principal.id),
        None => "anonymous".to_string(),
    }
}

async fn reports(RequireUser(principal): RequireUser) -> String {
    principal.id
}

async fn admin_flags(RequireAdmin(principal): RequireAdmin) -> String {
    format!("{}:{}", principal.id, principal.is_dev_mode)
}

fn app(state: AuthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/me", get(me))
        .route("/feed", get(feed))
        .route("/reports", get(reports))
        .route("/admin/flags", get(admin_flags))
        .with_state(state)
}

fn request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// A live mock provider plus a router guarded against it.
async fn guarded_app() -> (MockProvider, TestKey, Router) {
    let provider = MockProvider::start().await;
    let key = TestKey::generate("sig-key-1");
    provider.mount_discovery().await;
    provider.mount_jwks(&[&key]).await;

    let guard = AuthGuard::new(&provider.config()).unwrap();
    let router = app(AuthState::new(guard));
    (provider, key, router)
}

#[tokio::test]
async fn public_route_needs_no_credentials() {
    let (_provider, _key, router) = guarded_app().await;
    let response = router.oneshot(request("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_route_without_header_gets_challenge() {
    let (_provider, _key, router) = guarded_app().await;
    let response = router.oneshot(request("/me", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );
    let body = body_string(response).await;
    assert!(body.contains("unauthorized"), "body was {body}");
}

#[tokio::test]
async fn garbage_token_is_rejected_without_detail() {
    let (_provider, _key, router) = guarded_app().await;
    let response = router
        .oneshot(request("/me", Some("not-a-jwt")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_string(response).await;
    // Which check failed must not leak to the client.
    assert!(!body.contains("signature"), "body was {body}");
    assert!(!body.contains("malformed"), "body was {body}");
}

#[tokio::test]
async fn user_token_reaches_user_routes() {
    let (provider, key, router) = guarded_app().await;
    let token = key.mint(&claims_for("alice", &provider.issuer, &["user"]));

    let response = router
        .clone()
        .oneshot(request("/me", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "alice");

    let response = router
        .oneshot(request("/reports", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn user_token_is_forbidden_on_admin_routes() {
    let (provider, key, router) = guarded_app().await;
    let token = key.mint(&claims_for("alice", &provider.issuer, &["user"]));

    let response = router
        .oneshot(request("/admin/flags", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    // 403 means the credential was fine; no challenge to re-authenticate.
    assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
}

#[tokio::test]
async fn admin_role_satisfies_every_tier() {
    let (provider, key, router) = guarded_app().await;
    let token = key.mint(&claims_for("root", &provider.issuer, &["admin", "user"]));

    for uri in ["/me", "/reports", "/admin/flags"] {
        let response = router
            .clone()
            .oneshot(request(uri, Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "uri {uri}");
    }
}

#[tokio::test]
async fn optional_route_serves_anonymous_callers() {
    let (_provider, _key, router) = guarded_app().await;
    let response = router.oneshot(request("/feed", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "anonymous");
}

#[tokio::test]
async fn optional_route_personalizes_valid_credentials() {
    let (provider, key, router) = guarded_app().await;
    let token = key.mint(&claims_for("alice", &provider.issuer, &["user"]));

    let response = router.oneshot(request("/feed", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "personalized:alice");
}

#[tokio::test]
async fn optional_route_still_rejects_invalid_credentials() {
    let (provider, key, router) = guarded_app().await;
    let mut claims = claims_for("alice", &provider.issuer, &["user"]);
    claims["exp"] = serde_json::json!(common::unix_now() - 3600);
    let token = key.mint(&claims);

    let response = router.oneshot(request("/feed", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bypass_guard_grants_the_dev_principal_everywhere() {
    let mut config = MockProvider::start().await.config();
    config.bypass_auth = true;
    let guard = AuthGuard::new(&config).unwrap();
    assert!(guard.is_bypass());
    let router = app(AuthState::new(guard));

    let response = router
        .clone()
        .oneshot(request("/admin/flags", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "dev-user:true");

    let response = router.oneshot(request("/feed", None)).await.unwrap();
    assert_eq!(body_string(response).await, "personalized:dev-user");
}

#[tokio::test]
async fn provider_outage_surfaces_as_service_unavailable() {
    let provider = MockProvider::start().await;
    let key = TestKey::generate("sig-key-1");
    Mock::given(method("GET"))
        .and(path(MockProvider::discovery_path()))
        .respond_with(ResponseTemplate::new(500))
        .mount(&provider.server)
        .await;

    let guard = AuthGuard::new(&provider.config()).unwrap();
    let router = app(AuthState::new(guard));
    let token = key.mint(&claims_for("alice", &provider.issuer, &["user"]));

    let response = router.oneshot(request("/me", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_string(response).await;
    assert!(body.contains("service_unavailable"), "body was {body}");
}
