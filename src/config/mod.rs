//! Configuration module for Chat Gate
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use crate::auth::{CachePolicy, ClaimsPolicy, JwksKeyStore, JwtAuthenticator, TokenSource};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::{expand_env_vars, ConfigLoader};

/// Path of the key set relative to the issuer
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Server address cannot be empty".into(),
            ));
        }

        let auth = &self.auth;
        if !is_valid_http_url(&auth.issuer) {
            return Err(ConfigError::ValidationError(
                "Invalid issuer: must start with http:// or https://".into(),
            ));
        }

        if !is_valid_http_url(&auth.jwks_url()) {
            return Err(ConfigError::ValidationError(
                "Invalid jwks_url: must start with http:// or https://".into(),
            ));
        }

        if auth.client_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Client id cannot be empty".into(),
            ));
        }

        if let TokenSource::Cookie { name } = &auth.token_source {
            if name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "Cookie token source needs a cookie name".into(),
                ));
            }
        }

        if auth.key_cache.ttl_seconds == Some(0) {
            return Err(ConfigError::ValidationError(
                "Key cache ttl_seconds must be greater than 0".into(),
            ));
        }

        if auth.key_cache.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "Key fetch timeout_seconds must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    /// Mark cookies `Secure` and `SameSite=None`
    #[serde(default)]
    pub secure_cookies: bool,
}

/// Token verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Expected `iss` claim
    pub issuer: String,
    /// Expected `client_id` claim
    pub client_id: String,
    /// Key set URL, `<issuer>/.well-known/jwks.json` when unset
    #[serde(default)]
    pub jwks_url: Option<String>,
    #[serde(default)]
    pub token_source: TokenSource,
    #[serde(default)]
    pub key_cache: KeyCacheConfig,
}

impl AuthConfig {
    /// Effective key set URL
    pub fn jwks_url(&self) -> String {
        match &self.jwks_url {
            Some(url) => url.clone(),
            None => format!("{}{}", self.issuer.trim_end_matches('/'), JWKS_PATH),
        }
    }

    pub fn claims_policy(&self) -> ClaimsPolicy {
        ClaimsPolicy::new(&self.issuer, &self.client_id)
    }

    /// Remote key store for the configured issuer
    pub fn key_store(&self) -> JwksKeyStore {
        JwksKeyStore::new(&self.jwks_url())
            .with_cache_policy(self.key_cache.cache_policy())
            .with_timeout(Duration::from_secs(self.key_cache.timeout_seconds))
            .with_reject_duplicate_kids(self.key_cache.reject_duplicate_kids)
    }

    /// Authentication pipeline wired from this configuration
    pub fn authenticator(&self) -> JwtAuthenticator {
        JwtAuthenticator::new(Arc::new(self.key_store()), self.claims_policy())
            .with_token_source(self.token_source.clone())
    }
}

/// Key set caching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyCacheConfig {
    /// Refetch after this many seconds; cached for the process lifetime when unset
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub reject_duplicate_kids: bool,
}

impl KeyCacheConfig {
    pub fn cache_policy(&self) -> CachePolicy {
        match self.ttl_seconds {
            Some(secs) => CachePolicy::Ttl(Duration::from_secs(secs)),
            None => CachePolicy::Forever,
        }
    }
}

impl Default for KeyCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: None,
            timeout_seconds: default_fetch_timeout(),
            reject_duplicate_kids: false,
        }
    }
}

fn default_fetch_timeout() -> u64 {
    10
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            server: ServerConfig {
                address: "127.0.0.1:8000".into(),
                secure_cookies: false,
            },
            auth: AuthConfig {
                issuer: "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_example".into(),
                client_id: "test-client-id".into(),
                jwks_url: None,
                token_source: TokenSource::Bearer,
                key_cache: KeyCacheConfig::default(),
            },
            metrics: MetricsConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_default_jwks_url() {
        assert_eq!(
            config().auth.jwks_url(),
            "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_example/.well-known/jwks.json"
        );

        let mut config = config();
        config.auth.issuer.push('/');
        assert!(config.auth.jwks_url().ends_with("us-east-1_example/.well-known/jwks.json"));
    }

    #[test]
    fn test_explicit_jwks_url() {
        let mut config = config();
        config.auth.jwks_url = Some("http://localhost:9000/keys".into());
        assert_eq!(config.auth.jwks_url(), "http://localhost:9000/keys");
        assert_eq!(config.auth.key_store().endpoint(), "http://localhost:9000/keys");
    }

    #[test]
    fn test_invalid_issuer() {
        let mut config = config();
        config.auth.issuer = "cognito".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_empty_client_id() {
        let mut config = config();
        config.auth.client_id = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_cookie_name() {
        let mut config = config();
        config.auth.token_source = TokenSource::Cookie {
            name: String::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = config();
        config.auth.key_cache.ttl_seconds = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_policy() {
        let mut cache = KeyCacheConfig::default();
        assert_eq!(cache.cache_policy(), CachePolicy::Forever);

        cache.ttl_seconds = Some(300);
        assert_eq!(
            cache.cache_policy(),
            CachePolicy::Ttl(Duration::from_secs(300))
        );
    }
}
