//! JWKS (JSON Web Key Set) key store
//!
//! Fetches the issuer's published signing keys and caches them. By default
//! the cache lives until the process restarts; a TTL policy and an explicit
//! [`KeyStore::refresh`] are available for deployments that need to pick up
//! key rotation.
//!
//! # Example
//!
//! ```no_run
//! use chat_gate::auth::jwks::{CachePolicy, JwksKeyStore, KeyStore};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = JwksKeyStore::new(
//!     "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_example/.well-known/jwks.json",
//! )
//! .with_cache_policy(CachePolicy::Ttl(Duration::from_secs(3600)));
//!
//! let keys = store.get_keys().await?;
//! println!("{} signing keys", keys.len());
//! # Ok(())
//! # }
//! ```

use super::AuthError;
use crate::metrics;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Default timeout for key set requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A single JSON Web Key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (e.g., "RSA", "EC")
    pub kty: String,

    /// Key ID
    #[serde(default)]
    pub kid: Option<String>,

    /// Intended use ("sig" for signature)
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Algorithm (e.g., "RS256", "ES256")
    #[serde(default)]
    pub alg: Option<String>,

    // RSA parameters
    /// RSA modulus (base64url encoded)
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded)
    #[serde(default)]
    pub e: Option<String>,

    // EC parameters
    /// EC curve (e.g., "P-256")
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded)
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded)
    #[serde(default)]
    pub y: Option<String>,
}

impl Jwk {
    /// Build the verifying key from the published material
    ///
    /// Broken material is the provider's fault, so it surfaces as `KeyFetch`.
    pub fn to_decoding_key(&self) -> Result<DecodingKey, AuthError> {
        match self.kty.as_str() {
            "RSA" => {
                let n = self
                    .n
                    .as_ref()
                    .ok_or_else(|| AuthError::KeyFetch("Missing RSA modulus (n)".into()))?;
                let e = self
                    .e
                    .as_ref()
                    .ok_or_else(|| AuthError::KeyFetch("Missing RSA exponent (e)".into()))?;

                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| AuthError::KeyFetch(format!("Invalid RSA key: {}", e)))
            }
            "EC" => {
                let x = self
                    .x
                    .as_ref()
                    .ok_or_else(|| AuthError::KeyFetch("Missing EC x coordinate".into()))?;
                let y = self
                    .y
                    .as_ref()
                    .ok_or_else(|| AuthError::KeyFetch("Missing EC y coordinate".into()))?;

                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| AuthError::KeyFetch(format!("Invalid EC key: {}", e)))
            }
            other => Err(AuthError::KeyFetch(format!(
                "Unsupported key type: {}",
                other
            ))),
        }
    }

    /// Declared algorithm, if it is one the gateway verifies
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.alg.as_deref().and_then(asymmetric_algorithm)
    }
}

/// Map an algorithm name to an asymmetric signature algorithm
///
/// HMAC and `none` are never accepted: the key set only carries public keys.
pub(crate) fn asymmetric_algorithm(name: &str) -> Option<Algorithm> {
    match name {
        "RS256" => Some(Algorithm::RS256),
        "RS384" => Some(Algorithm::RS384),
        "RS512" => Some(Algorithm::RS512),
        "PS256" => Some(Algorithm::PS256),
        "PS384" => Some(Algorithm::PS384),
        "PS512" => Some(Algorithm::PS512),
        "ES256" => Some(Algorithm::ES256),
        "ES384" => Some(Algorithm::ES384),
        _ => None,
    }
}

/// JSON Web Key Set, in publication order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeySet {
    pub keys: Vec<Jwk>,
}

impl KeySet {
    /// Parse a key set document
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        serde_json::from_str(json).map_err(|e| AuthError::KeyFetch(e.to_string()))
    }

    /// Find a key by its key ID (kid); the first match wins
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    /// Key IDs that appear more than once
    pub fn duplicate_kids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for kid in self.keys.iter().filter_map(|k| k.kid.as_deref()) {
            if !seen.insert(kid) && !duplicates.contains(&kid) {
                duplicates.push(kid);
            }
        }
        duplicates
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Source of the issuer's signing keys
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Current key set, fetching it if the cache is empty or expired
    async fn get_keys(&self) -> Result<Arc<KeySet>, AuthError>;

    /// Fetch the key set again regardless of cache state
    async fn refresh(&self) -> Result<Arc<KeySet>, AuthError>;
}

/// How long a fetched key set stays valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Keep the first successful fetch until restart or explicit refresh
    #[default]
    Forever,
    /// Re-fetch once the cached set is older than this
    Ttl(Duration),
}

/// Cached key set with metadata
struct CachedKeySet {
    keys: Arc<KeySet>,
    fetched_at: Instant,
}

/// Key store backed by a remote JWKS endpoint
///
/// Concurrent callers that find the cache empty may each fetch; the results
/// are identical and the last write wins.
pub struct JwksKeyStore {
    /// JWKS endpoint URL
    endpoint: String,

    /// Cached keys
    cache: RwLock<Option<CachedKeySet>>,

    /// Cache lifetime
    cache_policy: CachePolicy,

    /// Reject key sets that publish the same kid twice
    reject_duplicate_kids: bool,

    /// HTTP client for fetching keys
    client: reqwest::Client,
}

impl JwksKeyStore {
    /// Create a key store for an endpoint; nothing is fetched until first use
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            cache: RwLock::new(None),
            cache_policy: CachePolicy::Forever,
            reject_duplicate_kids: false,
            client: build_client(DEFAULT_TIMEOUT),
        }
    }

    /// Set the cache policy
    #[must_use]
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// Treat a duplicated kid in the fetched set as a fetch error
    #[must_use]
    pub fn with_reject_duplicate_kids(mut self, reject: bool) -> Self {
        self.reject_duplicate_kids = reject;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    /// Drop the cached set so the next lookup fetches
    pub async fn invalidate(&self) {
        self.cache.write().await.take();
        debug!(endpoint = %self.endpoint, "JWKS cache invalidated");
    }

    async fn cached(&self) -> Option<Arc<KeySet>> {
        let cache = self.cache.read().await;
        let cached = cache.as_ref()?;
        match self.cache_policy {
            CachePolicy::Forever => Some(Arc::clone(&cached.keys)),
            CachePolicy::Ttl(ttl) if cached.fetched_at.elapsed() <= ttl => {
                Some(Arc::clone(&cached.keys))
            }
            CachePolicy::Ttl(_) => None,
        }
    }

    /// Fetch JWKS from endpoint
    async fn fetch(&self) -> Result<KeySet, AuthError> {
        debug!(endpoint = %self.endpoint, "Fetching JWKS");

        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyFetch(format!(
                "HTTP {}: {}",
                response.status(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        let keys: KeySet = response
            .json()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

        let duplicates = keys.duplicate_kids();
        if !duplicates.is_empty() {
            if self.reject_duplicate_kids {
                return Err(AuthError::KeyFetch(format!(
                    "Duplicate kid in key set: {}",
                    duplicates.join(", ")
                )));
            }
            warn!(kids = ?duplicates, "Key set publishes duplicate kids; first match wins");
        }

        Ok(keys)
    }

    async fn fetch_and_store(&self) -> Result<Arc<KeySet>, AuthError> {
        let result = self.fetch().await;
        metrics::record_key_fetch(result.is_ok());

        let keys = Arc::new(result.inspect_err(|e| {
            warn!(endpoint = %self.endpoint, error = %e, "JWKS fetch failed");
        })?);

        info!(endpoint = %self.endpoint, keys = keys.len(), "JWKS cached");
        *self.cache.write().await = Some(CachedKeySet {
            keys: Arc::clone(&keys),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }
}

#[async_trait]
impl KeyStore for JwksKeyStore {
    async fn get_keys(&self) -> Result<Arc<KeySet>, AuthError> {
        if let Some(keys) = self.cached().await {
            return Ok(keys);
        }
        self.fetch_and_store().await
    }

    async fn refresh(&self) -> Result<Arc<KeySet>, AuthError> {
        self.fetch_and_store().await
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Key store over a fixed key set
///
/// Useful for tests and for deployments that pin keys in configuration.
#[derive(Debug, Clone)]
pub struct StaticKeyStore {
    keys: Arc<KeySet>,
}

impl StaticKeyStore {
    pub fn new(keys: KeySet) -> Self {
        Self {
            keys: Arc::new(keys),
        }
    }

    /// Create a key store from a JWKS document
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        KeySet::from_json(json).map(Self::new)
    }
}

#[async_trait]
impl KeyStore for StaticKeyStore {
    async fn get_keys(&self) -> Result<Arc<KeySet>, AuthError> {
        Ok(Arc::clone(&self.keys))
    }

    async fn refresh(&self) -> Result<Arc<KeySet>, AuthError> {
        Ok(Arc::clone(&self.keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JWKS: &str = include_str!("../../tests/fixtures/jwks.json");

    fn rsa_jwk(kid: &str, n: &str) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: Some(kid.to_string()),
            key_use: Some("sig".to_string()),
            alg: Some("RS256".to_string()),
            n: Some(n.to_string()),
            e: Some("AQAB".to_string()),
            crv: None,
            x: None,
            y: None,
        }
    }

    #[test]
    fn test_parse_jwks() {
        let keys = KeySet::from_json(JWKS).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.keys[0].kid.as_deref(), Some("signing-key-1"));
        assert_eq!(keys.keys[1].crv.as_deref(), Some("P-256"));
    }

    #[test]
    fn test_jwk_to_decoding_key() {
        let keys = KeySet::from_json(JWKS).unwrap();
        for jwk in &keys.keys {
            assert!(jwk.to_decoding_key().is_ok(), "{:?} should decode", jwk.kid);
        }
    }

    #[test]
    fn test_missing_modulus_is_key_fetch_error() {
        let mut jwk = rsa_jwk("k", "AQAB");
        jwk.n = None;
        assert!(matches!(jwk.to_decoding_key(), Err(AuthError::KeyFetch(_))));
    }

    #[test]
    fn test_unsupported_key_type() {
        let mut jwk = rsa_jwk("k", "AQAB");
        jwk.kty = "oct".into();
        assert!(matches!(jwk.to_decoding_key(), Err(AuthError::KeyFetch(_))));
    }

    #[test]
    fn test_hmac_algorithm_not_accepted() {
        let mut jwk = rsa_jwk("k", "AQAB");
        jwk.alg = Some("HS256".into());
        assert_eq!(jwk.algorithm(), None);
        jwk.alg = Some("PS384".into());
        assert_eq!(jwk.algorithm(), Some(Algorithm::PS384));
    }

    #[test]
    fn test_find_first_match_wins() {
        let keys = KeySet {
            keys: vec![rsa_jwk("dup", "first"), rsa_jwk("dup", "second"), rsa_jwk("other", "x")],
        };
        assert_eq!(keys.find("dup").unwrap().n.as_deref(), Some("first"));
        assert!(keys.find("missing").is_none());
        assert_eq!(keys.duplicate_kids(), vec!["dup"]);
    }

    #[test]
    fn test_malformed_key_set() {
        assert!(matches!(
            KeySet::from_json(r#"{"not_keys": []}"#),
            Err(AuthError::KeyFetch(_))
        ));
    }

    #[tokio::test]
    async fn test_static_store_returns_same_set() {
        let store = StaticKeyStore::from_json(JWKS).unwrap();
        let first = store.get_keys().await.unwrap();
        let refreshed = store.refresh().await.unwrap();
        assert!(Arc::ptr_eq(&first, &refreshed));
    }

    #[test]
    fn test_default_cache_policy_is_forever() {
        let store = JwksKeyStore::new("https://issuer.test/.well-known/jwks.json");
        assert_eq!(store.cache_policy(), CachePolicy::Forever);
        assert_eq!(
            store.endpoint(),
            "https://issuer.test/.well-known/jwks.json"
        );
    }
}
