//! JWT Authentication pipeline
//!
//! Composes token source, parser, key store, verifier and claims validator
//! into one call per request: source -> parse -> key lookup -> verify ->
//! validate. Nothing is retried; the first failure is the answer.

use super::claims::{AuthenticatedUser, ClaimsPolicy, ClaimsValidator};
use super::jwks::KeyStore;
use super::source::TokenSource;
use super::token::UnverifiedToken;
use super::{verifier, AuthError, AuthRequest, Authenticator};
use crate::metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// JWT Authenticator
///
/// # Example
///
/// ```
/// use chat_gate::auth::{ClaimsPolicy, JwtAuthenticator, StaticKeyStore, TokenSource};
/// use std::sync::Arc;
///
/// let keys = StaticKeyStore::from_json(r#"{"keys": []}"#).unwrap();
/// let auth = JwtAuthenticator::new(
///     Arc::new(keys),
///     ClaimsPolicy::new("https://issuer.example.com", "my-client-id"),
/// )
/// .with_token_source(TokenSource::access_token_cookie());
/// ```
pub struct JwtAuthenticator {
    source: TokenSource,
    keys: Arc<dyn KeyStore>,
    validator: ClaimsValidator,
}

impl JwtAuthenticator {
    /// Create an authenticator reading bearer tokens
    pub fn new(keys: Arc<dyn KeyStore>, policy: ClaimsPolicy) -> Self {
        Self {
            source: TokenSource::Bearer,
            keys,
            validator: ClaimsValidator::new(policy),
        }
    }

    /// Set where tokens are read from
    #[must_use]
    pub fn with_token_source(mut self, source: TokenSource) -> Self {
        self.source = source;
        self
    }

    pub fn token_source(&self) -> &TokenSource {
        &self.source
    }

    pub fn key_store(&self) -> &Arc<dyn KeyStore> {
        &self.keys
    }

    async fn run(&self, request: &AuthRequest) -> Result<AuthenticatedUser, AuthError> {
        let raw = self.source.extract(request)?;
        let token = UnverifiedToken::parse(raw)?;

        let keys = self.keys.get_keys().await?;
        let jwk = keys.find(token.kid()).ok_or_else(|| {
            warn!(kid = %token.kid(), "No matching public key");
            AuthError::UnknownKey(token.kid().to_string())
        })?;

        let verified = verifier::verify(token, jwk)?;
        debug!("Signature verification succeeded");

        let claims = verified.claims()?;
        self.validator.validate(claims)
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    #[tracing::instrument(
        name = "auth.jwt",
        skip(self, request),
        fields(auth.source = self.source.label(), http.path = %request.path)
    )]
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthenticatedUser, AuthError> {
        let started = Instant::now();
        let result = self.run(request).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(user) => {
                metrics::record_auth_attempt(self.source.label(), "success", elapsed);
                info!(sub = %user.sub, "User authenticated");
            }
            Err(e) => {
                metrics::record_auth_attempt(self.source.label(), e.kind(), elapsed);
                match e {
                    AuthError::KeyFetch(_) => error!(kind = e.kind(), error = %e, "Authentication failed"),
                    AuthError::MissingCredential => debug!(kind = e.kind(), "No credential presented"),
                    _ => warn!(kind = e.kind(), error = %e, "Authentication rejected"),
                }
            }
        }

        result
    }
}
