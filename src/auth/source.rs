//! Token source adapters
//!
//! A deployment reads credentials from exactly one transport, chosen at
//! startup. Present-but-garbled values are passed through untouched; the
//! token parser is responsible for rejecting them.

use super::{AuthError, AuthRequest};
use serde::{Deserialize, Serialize};

/// Default cookie carrying the access token
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Where the raw token is read from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TokenSource {
    /// `Authorization: Bearer <token>`
    #[default]
    #[serde(rename = "bearer")]
    Bearer,
    /// A named cookie, `access_token` unless configured otherwise
    #[serde(rename = "cookie")]
    Cookie {
        #[serde(default = "default_cookie_name")]
        name: String,
    },
}

fn default_cookie_name() -> String {
    ACCESS_TOKEN_COOKIE.to_string()
}

impl TokenSource {
    /// Cookie source using the default cookie name
    pub fn access_token_cookie() -> Self {
        TokenSource::Cookie {
            name: default_cookie_name(),
        }
    }

    /// Label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            TokenSource::Bearer => "bearer",
            TokenSource::Cookie { .. } => "cookie",
        }
    }

    /// Extract the raw token
    ///
    /// # Errors
    ///
    /// `MissingCredential` when the transport carries no token.
    pub fn extract<'r>(&self, request: &'r AuthRequest) -> Result<&'r str, AuthError> {
        let token = match self {
            TokenSource::Bearer => request.header("authorization").and_then(bearer_credential),
            TokenSource::Cookie { name } => request
                .header("cookie")
                .and_then(|cookies| cookie_value(cookies, name)),
        };

        token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingCredential)
    }
}

/// Credential part of a `Bearer` authorization header
fn bearer_credential(header: &str) -> Option<&str> {
    let (scheme, credential) = header.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(credential.trim())
    } else {
        None
    }
}

/// Value of `name` in a `Cookie` header (`a=1; b=2`)
fn cookie_value<'c>(header: &'c str, name: &str) -> Option<&'c str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, value: &str) -> AuthRequest {
        AuthRequest::default().with_header(name, value)
    }

    #[test]
    fn test_bearer_header() {
        let req = request("Authorization", "Bearer abc.def.ghi");
        assert_eq!(TokenSource::Bearer.extract(&req).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_bearer_scheme_case_insensitive() {
        let req = request("authorization", "bearer abc");
        assert_eq!(TokenSource::Bearer.extract(&req).unwrap(), "abc");
    }

    #[test]
    fn test_missing_header() {
        let req = AuthRequest::default();
        assert!(matches!(
            TokenSource::Bearer.extract(&req),
            Err(AuthError::MissingCredential)
        ));
    }

    #[test]
    fn test_other_scheme_is_missing() {
        let req = request("authorization", "Basic dXNlcjpwYXNz");
        assert!(matches!(
            TokenSource::Bearer.extract(&req),
            Err(AuthError::MissingCredential)
        ));
    }

    #[test]
    fn test_empty_bearer_is_missing() {
        let req = request("authorization", "Bearer ");
        assert!(matches!(
            TokenSource::Bearer.extract(&req),
            Err(AuthError::MissingCredential)
        ));
    }

    #[test]
    fn test_garbage_token_passed_through() {
        let req = request("authorization", "Bearer invalid_token");
        assert_eq!(TokenSource::Bearer.extract(&req).unwrap(), "invalid_token");
    }

    #[test]
    fn test_cookie_source() {
        let req = request("cookie", "theme=dark; access_token=abc.def.ghi; refresh_token=r");
        let source = TokenSource::access_token_cookie();
        assert_eq!(source.extract(&req).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_cookie_source_ignores_bearer_header() {
        let req = request("authorization", "Bearer abc");
        assert!(matches!(
            TokenSource::access_token_cookie().extract(&req),
            Err(AuthError::MissingCredential)
        ));
    }

    #[test]
    fn test_cookie_name_must_match_exactly() {
        let req = request("cookie", "my_access_token=abc");
        assert!(TokenSource::access_token_cookie().extract(&req).is_err());
    }

    #[test]
    fn test_custom_cookie_name() {
        let req = request("cookie", "session=xyz");
        let source = TokenSource::Cookie {
            name: "session".into(),
        };
        assert_eq!(source.extract(&req).unwrap(), "xyz");
    }

    #[test]
    fn test_deserialize_source() {
        let bearer: TokenSource = serde_yaml::from_str("type: bearer").unwrap();
        assert_eq!(bearer, TokenSource::Bearer);

        let cookie: TokenSource = serde_yaml::from_str("type: cookie").unwrap();
        assert_eq!(cookie, TokenSource::access_token_cookie());
    }
}
