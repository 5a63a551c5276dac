//! Shared test infrastructure: a wiremock Keycloak-shaped provider and an
//! RSA-backed token mint.

#![allow(dead_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockGuard, MockServer, ResponseTemplate};

use spendmon_auth::{AuthConfig, DiscoveryCache, KeyCache, TokenValidator};

pub const REALM_PATH: &str = "/realms/spending-monitor";

/// An RSA signing key plus its public JWK, for minting test tokens.
pub struct TestKey {
    pub kid: String,
    encoding: EncodingKey,
    pub jwk: serde_json::Value,
}

impl TestKey {
    pub fn generate(kid: &str) -> Self {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 2048).expect("generate RSA key");
        let pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .expect("encode private key");
        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("load private key");

        let public = private.to_public_key();
        let jwk = json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": kid,
            "n": URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
        });

        Self {
            kid: kid.to_string(),
            encoding,
            jwk,
        }
    }

    /// Mint an RS256 token with this key's `kid` in the header.
    pub fn mint(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        encode(&header, claims, &self.encoding).expect("encode test token")
    }
}

/// A wiremock server laid out like a Keycloak realm.
pub struct MockProvider {
    pub server: MockServer,
    pub issuer: String,
}

impl MockProvider {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let issuer = format!("{}{}", server.uri(), REALM_PATH);
        Self { server, issuer }
    }

    pub fn discovery_path() -> String {
        format!("{REALM_PATH}/.well-known/openid-configuration")
    }

    pub fn jwks_path() -> String {
        format!("{REALM_PATH}/protocol/openid-connect/certs")
    }

    pub fn discovery_document(&self) -> serde_json::Value {
        json!({
            "issuer": self.issuer,
            "jwks_uri": format!("{}/protocol/openid-connect/certs", self.issuer),
            "authorization_endpoint": format!("{}/protocol/openid-connect/auth", self.issuer),
            "token_endpoint": format!("{}/protocol/openid-connect/token", self.issuer),
            "userinfo_endpoint": format!("{}/protocol/openid-connect/userinfo", self.issuer),
            "end_session_endpoint": format!("{}/protocol/openid-connect/logout", self.issuer),
        })
    }

    pub async fn mount_discovery(&self) {
        Mock::given(method("GET"))
            .and(path(Self::discovery_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(self.discovery_document()))
            .mount(&self.server)
            .await;
    }

    /// Mount discovery asserting it is fetched exactly `calls` times.
    pub async fn mount_discovery_expect(&self, calls: u64) {
        Mock::given(method("GET"))
            .and(path(Self::discovery_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(self.discovery_document()))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_jwks(&self, keys: &[&TestKey]) {
        Mock::given(method("GET"))
            .and(path(Self::jwks_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(keys)))
            .mount(&self.server)
            .await;
    }

    /// Mount the JWKS endpoint asserting it is fetched exactly `calls` times.
    pub async fn mount_jwks_expect(&self, keys: &[&TestKey], calls: u64) {
        Mock::given(method("GET"))
            .and(path(Self::jwks_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(keys)))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Scoped JWKS mount; the mock unmounts when the guard drops.
    pub async fn mount_jwks_scoped(&self, keys: &[&TestKey], calls: u64) -> MockGuard {
        Mock::given(method("GET"))
            .and(path(Self::jwks_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(keys)))
            .expect(calls)
            .mount_as_scoped(&self.server)
            .await
    }

    /// A config pointing at this mock, with production-like defaults.
    pub fn config(&self) -> AuthConfig {
        AuthConfig::new(&self.issuer, "spending-monitor")
    }
}

pub fn jwks_body(keys: &[&TestKey]) -> serde_json::Value {
    json!({ "keys": keys.iter().map(|k| &k.jwk).collect::<Vec<_>>() })
}

/// Build the validator stack the way `AuthGuard::new` does, but with the
/// caches exposed for direct assertions.
pub fn build_validator(config: &AuthConfig) -> (TokenValidator, DiscoveryCache, KeyCache) {
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .expect("build HTTP client");
    let discovery = DiscoveryCache::new(config, http.clone());
    let keys = KeyCache::new(config, discovery.clone(), http);
    let validator = TokenValidator::new(config, discovery.clone(), keys.clone());
    (validator, discovery, keys)
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs()
}

/// Claims in the shape Keycloak emits for the spending-monitor realm.
pub fn claims_for(sub: &str, issuer: &str, roles: &[&str]) -> serde_json::Value {
    let now = unix_now();
    json!({
        "sub": sub,
        "iss": issuer,
        "aud": "spending-monitor",
        "exp": now + 3600,
        "iat": now,
        "email": format!("{sub}@example.com"),
        "preferred_username": sub,
        "realm_access": { "roles": roles },
    })
}
