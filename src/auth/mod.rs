//! Authentication module
//!
//! Verifies OIDC access tokens issued by an external identity provider and
//! turns them into an [`AuthenticatedUser`].
//!
//! The pipeline runs in a fixed order, short-circuiting on the first failure:
//!
//! 1. [`source`] pulls the raw token out of the request (bearer header or cookie)
//! 2. [`token`] splits and decodes the header without trusting it
//! 3. [`jwks`] resolves the header `kid` against the issuer's key set
//! 4. [`verifier`] checks the signature over the signing input
//! 5. [`claims`] enforces expiry, issuer, token use and client id

use async_trait::async_trait;
use hyper::StatusCode;
use std::collections::HashMap;
use thiserror::Error;

pub mod claims;
pub mod jwks;
pub mod jwt;
pub mod source;
pub mod token;
pub mod verifier;

pub use claims::{AuthenticatedUser, Claims, ClaimsPolicy, ClaimsValidator};
pub use jwks::{CachePolicy, JwksKeyStore, KeySet, KeyStore, StaticKeyStore};
pub use jwt::JwtAuthenticator;
pub use source::TokenSource;
pub use token::{TokenStage, UnverifiedToken, VerifiedToken};

/// Authentication errors
///
/// Every variant is terminal for the request. [`AuthError::status`] and
/// [`AuthError::detail`] give what the caller is allowed to see; the
/// `Display` text is for logs only.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingCredential,

    #[error("Malformed token ({stage}): {reason}")]
    MalformedToken { stage: TokenStage, reason: String },

    #[error("Signing key not found: {0}")]
    UnknownKey(String),

    #[error("JWKS fetch error: {0}")]
    KeyFetch(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid issuer")]
    InvalidIssuer,

    #[error("Invalid token use")]
    InvalidTokenUse,

    #[error("Invalid client id")]
    InvalidClient,

    #[error("Invalid claims: {0}")]
    ClaimShape(String),
}

impl AuthError {
    pub(crate) fn malformed(stage: TokenStage, reason: impl Into<String>) -> Self {
        AuthError::MalformedToken {
            stage,
            reason: reason.into(),
        }
    }

    /// HTTP status the caller receives
    ///
    /// Header-stage parse failures are 403 ("not a JWT at all"), while
    /// structural failures after the header decoded are 401 ("JWT, but
    /// untrusted").
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MalformedToken {
                stage: TokenStage::Header,
                ..
            } => StatusCode::FORBIDDEN,
            AuthError::ClaimShape(_) => StatusCode::FORBIDDEN,
            AuthError::KeyFetch(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Generic, client-safe detail string
    pub fn detail(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "Not authenticated",
            AuthError::MalformedToken {
                stage: TokenStage::Header,
                ..
            } => "Invalid token header",
            AuthError::MalformedToken { .. } => "Invalid token",
            AuthError::UnknownKey(_) => "Public key not found",
            AuthError::KeyFetch(_) => "Internal server error",
            AuthError::InvalidSignature => "Signature verification failed",
            AuthError::TokenExpired => "Token is expired",
            AuthError::InvalidIssuer => "Invalid issuer",
            AuthError::InvalidTokenUse => "Invalid token use",
            AuthError::InvalidClient => "Invalid client ID",
            AuthError::ClaimShape(_) => "Invalid token claims",
        }
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::MalformedToken { .. } => "malformed_token",
            AuthError::UnknownKey(_) => "unknown_key",
            AuthError::KeyFetch(_) => "key_fetch",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::InvalidTokenUse => "invalid_token_use",
            AuthError::InvalidClient => "invalid_client",
            AuthError::ClaimShape(_) => "claim_shape",
        }
    }
}

/// Authenticator trait
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate a request
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthenticatedUser, AuthError>;
}

/// Authentication request context
///
/// Header names are stored lowercase. Repeated `cookie` headers are joined
/// with `"; "` by the server before they land here.
#[derive(Debug, Default, Clone)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub method: String,
    pub path: String,
}

impl AuthRequest {
    /// Get header value by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Add a header, lowercasing its name
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }
}
