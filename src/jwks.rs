//! Signing key set cache
//!
//! Holds the provider's JWKS wholesale and replaces it atomically on refresh;
//! there are no partial key updates because providers rotate keys as a set. A
//! lookup miss triggers a single-flight refetch of the whole set and exactly one
//! retry; a key id still absent after that is `UnknownKey`. An on-access TTL
//! (default 10 minutes) bounds exposure to revoked keys, and a minimum refresh
//! interval stops a flood of unknown key ids from hammering the provider (a
//! rotation landing inside that window is picked up once it lapses).

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::discovery::DiscoveryCache;
use crate::error::AuthError;

#[derive(Debug, Clone)]
struct CachedKeys {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

impl CachedKeys {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Cache over the provider's signing keys, resolved through [`DiscoveryCache`]
/// for the JWKS URI. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct KeyCache {
    http: reqwest::Client,
    discovery: DiscoveryCache,
    ttl: Duration,
    min_refresh_interval: Duration,
    cache: Arc<RwLock<Option<CachedKeys>>>,
    refresh_lock: Arc<Mutex<()>>,
    last_attempt: Arc<RwLock<Option<Instant>>>,
    last_failure: Arc<RwLock<Option<(Instant, String)>>>,
}

impl KeyCache {
    /// Create a key cache backed by the given discovery cache and HTTP client.
    pub fn new(config: &AuthConfig, discovery: DiscoveryCache, http: reqwest::Client) -> Self {
        Self {
            http,
            discovery,
            ttl: config.jwks_ttl,
            min_refresh_interval: config.min_refresh_interval,
            cache: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
            last_attempt: Arc::new(RwLock::new(None)),
            last_failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Resolve a signing key by key id.
    ///
    /// # Errors
    ///
    /// `UnknownKey` if the id is absent even after a refresh;
    /// `ProviderUnavailable` if the set cannot be fetched and no cached set
    /// resolves the id.
    pub async fn get_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        if let Some(cached) = self.cache.read().await.as_ref()
            && cached.is_fresh(self.ttl)
        {
            if let Some(jwk) = cached.keys.find(kid) {
                return decode_key(jwk, kid);
            }
            debug!(kid, "key id not in cached set, refreshing");
        }

        match self.refresh().await {
            Ok(keys) => match keys.find(kid) {
                Some(jwk) => decode_key(jwk, kid),
                None => Err(AuthError::UnknownKey {
                    kid: kid.to_string(),
                }),
            },
            Err(err) => {
                // Stale fallback: a set we already trusted can still resolve
                // the id. A missing id stays an outage error because only a
                // fresh set could tell rotation apart from forgery.
                if let Some(cached) = self.cache.read().await.as_ref()
                    && let Some(jwk) = cached.keys.find(kid)
                {
                    warn!(
                        kid,
                        age_secs = cached.fetched_at.elapsed().as_secs(),
                        "JWKS refresh failed, resolving key from stale set"
                    );
                    return decode_key(jwk, kid);
                }
                Err(err)
            }
        }
    }

    /// Drop the cached key set. Test hook and manual invalidation.
    pub async fn clear(&self) {
        *self.cache.write().await = None;
        *self.last_attempt.write().await = None;
        *self.last_failure.write().await = None;
    }

    /// Refresh the key set, single-flight. Followers that queued behind the
    /// leader find the cache repopulated (or the leader's failure recorded)
    /// and skip the network entirely, as do callers arriving within the
    /// minimum refresh interval.
    async fn refresh(&self) -> Result<Arc<JwkSet>, AuthError> {
        let wait_start = Instant::now();
        let _flight = self.refresh_lock.lock().await;

        if let Some(cached) = self.cache.read().await.as_ref()
            && cached.fetched_at.elapsed() < self.min_refresh_interval
        {
            return Ok(Arc::clone(&cached.keys));
        }

        if let Some(last) = *self.last_attempt.read().await
            && last.elapsed() < self.min_refresh_interval
            && let Some(cached) = self.cache.read().await.as_ref()
        {
            warn!(
                since_last_ms = last.elapsed().as_millis(),
                "JWKS refresh rate limited, using cached set"
            );
            return Ok(Arc::clone(&cached.keys));
        }

        // A failure recorded after we began waiting came from the flight we
        // queued behind: share its outcome instead of retrying serially.
        if let Some((failed_at, message)) = self.last_failure.read().await.clone()
            && failed_at >= wait_start
        {
            return Err(AuthError::ProviderUnavailable(message));
        }

        // Runs on its own task so a cancelled waiter cannot kill the fetch
        // that other waiters share.
        let this = self.clone();
        let outcome = tokio::spawn(async move { this.fetch_and_store().await })
            .await
            .map_err(|e| AuthError::ProviderUnavailable(format!("JWKS task failed: {e}")))?;

        if let Err(err) = &outcome {
            let message = match err {
                AuthError::ProviderUnavailable(message) => message.clone(),
                other => other.to_string(),
            };
            *self.last_failure.write().await = Some((Instant::now(), message));
        }
        outcome
    }

    async fn fetch_and_store(&self) -> Result<Arc<JwkSet>, AuthError> {
        *self.last_attempt.write().await = Some(Instant::now());

        let metadata = self.discovery.get_metadata().await?;
        debug!(jwks_uri = %metadata.jwks_uri, "fetching JWKS");

        let response = self
            .http
            .get(&metadata.jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(format!("JWKS fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::ProviderUnavailable(format!(
                "JWKS endpoint returned status {}",
                response.status()
            )));
        }

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(format!("invalid JWKS document: {e}")))?;

        info!(key_count = keys.keys.len(), "loaded signing key set");

        let keys = Arc::new(keys);
        *self.cache.write().await = Some(CachedKeys {
            keys: Arc::clone(&keys),
            fetched_at: Instant::now(),
        });
        *self.last_failure.write().await = None;
        Ok(keys)
    }
}

/// Convert a JWK to a decoding key. A key that cannot be converted is as good
/// as absent, so conversion failure maps to `UnknownKey`.
fn decode_key(jwk: &Jwk, kid: &str) -> Result<DecodingKey, AuthError> {
    DecodingKey::from_jwk(jwk).map_err(|e| {
        warn!(kid, error = %e, "signing key present but unusable");
        AuthError::UnknownKey {
            kid: kid.to_string(),
        }
    })
}
