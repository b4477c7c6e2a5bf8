//! Claims validation
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. `exp` present and not in the past
//! 2. `iss` equals the configured issuer
//! 3. `token_use` equals `"access"`
//! 4. `client_id` equals the configured app client id
//! 5. the remaining identity fields fit [`AuthenticatedUser`]

use super::AuthError;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use tracing::warn;

/// The only `token_use` accepted at the gateway
pub const ACCESS_TOKEN_USE: &str = "access";

/// Claims decoded from a verified token payload
#[derive(Debug, Clone, PartialEq)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub(crate) fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// `exp` as seconds since the epoch, if numeric
    pub fn expiry(&self) -> Option<f64> {
        self.0.get("exp").and_then(Value::as_f64)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Exact-match policy for issuer and client id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimsPolicy {
    pub issuer: String,
    pub client_id: String,
}

impl ClaimsPolicy {
    pub fn new(issuer: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
        }
    }
}

/// Identity of a caller whose token passed every check
///
/// Only [`ClaimsValidator`] builds one of these.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthenticatedUser {
    pub sub: String,
    pub username: String,
    pub iss: String,
    pub client_id: String,
    pub token_use: String,
    pub scope: Option<String>,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub auth_time: Option<i64>,
    pub origin_jti: Option<String>,
    pub event_id: Option<String>,
    #[serde(skip)]
    _validated: (),
}

/// Wire shape of the identity claims
#[derive(Deserialize)]
struct IdentityClaims {
    sub: String,
    username: String,
    iss: String,
    client_id: String,
    token_use: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(deserialize_with = "numeric_date")]
    exp: i64,
    #[serde(deserialize_with = "numeric_date")]
    iat: i64,
    jti: String,
    #[serde(default, deserialize_with = "optional_numeric_date")]
    auth_time: Option<i64>,
    #[serde(default)]
    origin_jti: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
}

/// Whole seconds of a NumericDate; fractional values are truncated
fn seconds(number: &Number) -> Option<i64> {
    if let Some(secs) = number.as_i64() {
        return Some(secs);
    }
    let secs = number.as_f64()?;
    (secs.is_finite() && secs >= i64::MIN as f64 && secs < i64::MAX as f64)
        .then(|| secs.trunc() as i64)
}

fn numeric_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let number = Number::deserialize(deserializer)?;
    seconds(&number).ok_or_else(|| D::Error::custom(format!("date out of range: {}", number)))
}

fn optional_numeric_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<i64>, D::Error> {
    match Option::<Number>::deserialize(deserializer)? {
        Some(number) => seconds(&number)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("date out of range: {}", number))),
        None => Ok(None),
    }
}

impl AuthenticatedUser {
    fn from_claims(claims: Claims) -> Result<Self, AuthError> {
        let identity: IdentityClaims = serde_json::from_value(Value::Object(claims.0))
            .map_err(|e| AuthError::ClaimShape(e.to_string()))?;

        Ok(Self {
            sub: identity.sub,
            username: identity.username,
            iss: identity.iss,
            client_id: identity.client_id,
            token_use: identity.token_use,
            scope: identity.scope,
            exp: identity.exp,
            iat: identity.iat,
            jti: identity.jti,
            auth_time: identity.auth_time,
            origin_jti: identity.origin_jti,
            event_id: identity.event_id,
            _validated: (),
        })
    }

    /// Whitespace-separated scopes granted to the token
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.as_deref().unwrap_or_default().split_whitespace()
    }

    #[cfg(test)]
    pub(crate) fn for_tests(sub: &str, username: &str) -> Self {
        Self {
            sub: sub.into(),
            username: username.into(),
            iss: "https://issuer.test".into(),
            client_id: "test-client-id".into(),
            token_use: ACCESS_TOKEN_USE.into(),
            scope: None,
            exp: 9_999_999_999,
            iat: 0,
            jti: "test-jti".into(),
            auth_time: None,
            origin_jti: None,
            event_id: None,
            _validated: (),
        }
    }
}

/// Claims validator
#[derive(Debug, Clone)]
pub struct ClaimsValidator {
    policy: ClaimsPolicy,
}

impl ClaimsValidator {
    pub fn new(policy: ClaimsPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ClaimsPolicy {
        &self.policy
    }

    /// Validate against the current wall-clock time
    pub fn validate(&self, claims: Claims) -> Result<AuthenticatedUser, AuthError> {
        self.validate_at(claims, chrono::Utc::now().timestamp())
    }

    /// Validate as if the current time were `now` (seconds since the epoch)
    ///
    /// # Errors
    ///
    /// The first violated rule, in the order listed in the module docs.
    pub fn validate_at(&self, claims: Claims, now: i64) -> Result<AuthenticatedUser, AuthError> {
        check_expiry(&claims, now)?;
        self.check_issuer(&claims)?;
        check_token_use(&claims)?;
        self.check_client(&claims)?;
        AuthenticatedUser::from_claims(claims)
    }

    fn check_issuer(&self, claims: &Claims) -> Result<(), AuthError> {
        match claims.get_str("iss") {
            Some(iss) if iss == self.policy.issuer => Ok(()),
            other => {
                warn!(issuer = ?other, "Token issuer mismatch");
                Err(AuthError::InvalidIssuer)
            }
        }
    }

    fn check_client(&self, claims: &Claims) -> Result<(), AuthError> {
        match claims.get_str("client_id") {
            Some(client_id) if client_id == self.policy.client_id => Ok(()),
            other => {
                warn!(client_id = ?other, "Token client id mismatch");
                Err(AuthError::InvalidClient)
            }
        }
    }
}

// Missing or non-numeric exp is treated as already expired.
fn check_expiry(claims: &Claims, now: i64) -> Result<(), AuthError> {
    match claims.expiry() {
        Some(exp) if now as f64 <= exp => Ok(()),
        _ => Err(AuthError::TokenExpired),
    }
}

fn check_token_use(claims: &Claims) -> Result<(), AuthError> {
    match claims.get_str("token_use") {
        Some(ACCESS_TOKEN_USE) => Ok(()),
        other => {
            warn!(token_use = ?other, "Token is not an access token");
            Err(AuthError::InvalidTokenUse)
        }
    }
}
