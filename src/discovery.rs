//! OIDC provider discovery with TTL caching
//!
//! Fetches `{issuer}/.well-known/openid-configuration` with a bounded timeout and
//! caches the result for the configured TTL. Concurrent callers needing a refresh
//! share a single in-flight fetch; waiters queued behind a failed flight share its
//! failure rather than retrying in turn. If a refresh fails and a previous document is
//! still within the grace window, the stale document is served and a warning
//! logged; with no usable cache the failure surfaces as `ProviderUnavailable`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::error::AuthError;

/// OIDC provider metadata, the subset of the discovery document this crate
/// consumes plus a pass-through map for the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Issuer URL; tokens must carry exactly this in `iss`.
    pub issuer: String,
    /// Where the provider publishes its signing keys.
    pub jwks_uri: String,
    /// Token endpoint, if advertised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    /// Authorization endpoint, if advertised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    /// Userinfo endpoint, if advertised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    /// RP-initiated logout endpoint, if advertised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
    /// Remaining discovery fields, untouched.
    #[serde(flatten)]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

/// Cache entry: the document plus when it was fetched.
#[derive(Debug, Clone)]
struct CachedMetadata {
    metadata: Arc<ProviderMetadata>,
    fetched_at: Instant,
}

impl CachedMetadata {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }

    fn within_grace(&self, ttl: Duration, grace: Duration) -> bool {
        self.fetched_at.elapsed() < ttl + grace
    }
}

/// TTL cache over the provider's discovery document.
///
/// Cheap to clone; clones share the underlying cache. The common read path takes
/// a read lock only; refreshes are serialized through a separate mutex so exactly
/// one fetch is in flight no matter how many requests hit an expired cache.
#[derive(Debug, Clone)]
pub struct DiscoveryCache {
    http: reqwest::Client,
    discovery_url: String,
    issuer_url: String,
    ttl: Duration,
    grace: Duration,
    endpoint_fallback: bool,
    cache: Arc<RwLock<Option<CachedMetadata>>>,
    refresh_lock: Arc<Mutex<()>>,
    last_failure: Arc<RwLock<Option<(Instant, String)>>>,
}

impl DiscoveryCache {
    /// Create a cache for the configured issuer, using the given HTTP client
    /// (which carries the bounded fetch timeout).
    pub fn new(config: &AuthConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            discovery_url: config.discovery_url(),
            issuer_url: config.issuer_url.trim_end_matches('/').to_string(),
            ttl: config.discovery_ttl,
            grace: config.discovery_grace,
            endpoint_fallback: config.endpoint_fallback,
            cache: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
            last_failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Get the provider metadata, fetching or refreshing as needed.
    ///
    /// # Errors
    ///
    /// `ProviderUnavailable` when the discovery endpoint cannot be reached and
    /// no cached document is within the grace window.
    pub async fn get_metadata(&self) -> Result<Arc<ProviderMetadata>, AuthError> {
        if let Some(cached) = self.cache.read().await.as_ref()
            && cached.is_fresh(self.ttl)
        {
            debug!(discovery_url = %self.discovery_url, "using cached provider metadata");
            return Ok(Arc::clone(&cached.metadata));
        }

        // Single-flight: the leader fetches while followers queue here, then
        // find the cache freshly populated on re-check.
        let wait_start = Instant::now();
        let _flight = self.refresh_lock.lock().await;
        if let Some(cached) = self.cache.read().await.as_ref()
            && cached.is_fresh(self.ttl)
        {
            return Ok(Arc::clone(&cached.metadata));
        }

        // A failure recorded after we began waiting came from the flight we
        // queued behind: share its outcome instead of retrying serially.
        if let Some((failed_at, message)) = self.last_failure.read().await.clone()
            && failed_at >= wait_start
        {
            return self
                .degraded(AuthError::ProviderUnavailable(message))
                .await;
        }

        // The fetch runs on its own task so that a cancelled waiter abandons
        // its await without killing the refresh other waiters share.
        let this = self.clone();
        let outcome = tokio::spawn(async move { this.fetch_and_store().await })
            .await
            .map_err(|e| AuthError::ProviderUnavailable(format!("discovery task failed: {e}")))?;

        match outcome {
            Ok(metadata) => Ok(metadata),
            Err(err) => {
                let message = match &err {
                    AuthError::ProviderUnavailable(message) => message.clone(),
                    other => other.to_string(),
                };
                *self.last_failure.write().await = Some((Instant::now(), message));
                self.degraded(err).await
            }
        }
    }

    /// Current issuer string as the provider advertises it.
    pub async fn current_issuer(&self) -> Result<String, AuthError> {
        Ok(self.get_metadata().await?.issuer.clone())
    }

    /// Drop the cached document. Test hook and manual invalidation.
    pub async fn clear(&self) {
        *self.cache.write().await = None;
        *self.last_failure.write().await = None;
    }

    async fn fetch_and_store(&self) -> Result<Arc<ProviderMetadata>, AuthError> {
        debug!(discovery_url = %self.discovery_url, "fetching OIDC discovery document");

        let response = self
            .http
            .get(&self.discovery_url)
            .send()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(format!("discovery fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::ProviderUnavailable(format!(
                "discovery endpoint returned status {}",
                response.status()
            )));
        }

        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(format!("invalid discovery document: {e}")))?;

        info!(
            issuer = %metadata.issuer,
            jwks_uri = %metadata.jwks_uri,
            "loaded OIDC provider metadata"
        );

        let metadata = Arc::new(metadata);
        *self.cache.write().await = Some(CachedMetadata {
            metadata: Arc::clone(&metadata),
            fetched_at: Instant::now(),
        });
        *self.last_failure.write().await = None;
        Ok(metadata)
    }

    /// Handle a failed refresh: optional endpoint fallback, then stale-within-
    /// grace, then surface the error.
    async fn degraded(&self, err: AuthError) -> Result<Arc<ProviderMetadata>, AuthError> {
        if self.endpoint_fallback {
            warn!(
                error = %err,
                issuer = %self.issuer_url,
                "discovery unreachable, synthesizing Keycloak endpoints from issuer URL"
            );
            let metadata = Arc::new(self.fallback_metadata());
            *self.cache.write().await = Some(CachedMetadata {
                metadata: Arc::clone(&metadata),
                fetched_at: Instant::now(),
            });
            return Ok(metadata);
        }

        if let Some(cached) = self.cache.read().await.as_ref()
            && cached.within_grace(self.ttl, self.grace)
        {
            warn!(
                error = %err,
                age_secs = cached.fetched_at.elapsed().as_secs(),
                "discovery refresh failed, serving stale metadata within grace window"
            );
            return Ok(Arc::clone(&cached.metadata));
        }

        Err(err)
    }

    /// Keycloak publishes its endpoints under a fixed path layout beneath the
    /// realm issuer, which makes this synthesis possible without discovery.
    fn fallback_metadata(&self) -> ProviderMetadata {
        let base = format!("{}/protocol/openid-connect", self.issuer_url);
        ProviderMetadata {
            issuer: self.issuer_url.clone(),
            jwks_uri: format!("{base}/certs"),
            token_endpoint: Some(format!("{base}/token")),
            authorization_endpoint: Some(format!("{base}/auth")),
            userinfo_endpoint: Some(format!("{base}/userinfo")),
            end_session_endpoint: Some(format!("{base}/logout")),
            additional: serde_json::Map::new(),
        }
    }
}
