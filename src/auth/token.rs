//! Compact token parsing
//!
//! Splits `header.payload.signature` without trusting any of it. The payload
//! is only decoded through [`VerifiedToken`], which nothing but the signature
//! verifier can construct.

use super::claims::Claims;
use super::AuthError;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// base64url, accepting both padded and unpadded input
pub(crate) const B64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Where a malformed token was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStage {
    /// Segments or header JSON unreadable: not a JWT at all
    Header,
    /// Header readable but the rest of the structure is not usable
    Body,
}

impl fmt::Display for TokenStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenStage::Header => f.write_str("header"),
            TokenStage::Body => f.write_str("body"),
        }
    }
}

/// Decoded JOSE header
///
/// `kid` is kept as raw JSON so a non-string identifier is rejected as an
/// untrusted token rather than an unreadable header.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenHeader {
    #[serde(default)]
    pub kid: Option<Value>,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub typ: Option<String>,
}

/// A parsed token whose signature has not been checked
#[derive(Debug)]
pub struct UnverifiedToken<'a> {
    header: TokenHeader,
    kid: String,
    signing_input: &'a str,
    payload: &'a str,
    signature: Vec<u8>,
}

impl<'a> UnverifiedToken<'a> {
    /// Parse a compact token
    ///
    /// # Errors
    ///
    /// `MalformedToken` with [`TokenStage::Header`] when the segments or the
    /// header JSON cannot be read, and [`TokenStage::Body`] when the header
    /// has no string `kid` or the signature segment is not base64url.
    pub fn parse(raw: &'a str) -> Result<Self, AuthError> {
        let (signing_input, signature_segment) = raw
            .rsplit_once('.')
            .ok_or_else(|| AuthError::malformed(TokenStage::Header, "not enough segments"))?;
        let (header_segment, payload) = signing_input
            .split_once('.')
            .ok_or_else(|| AuthError::malformed(TokenStage::Header, "not enough segments"))?;

        let header_bytes = B64URL.decode(header_segment).map_err(|e| {
            AuthError::malformed(TokenStage::Header, format!("header encoding: {}", e))
        })?;
        let header: TokenHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
            AuthError::malformed(TokenStage::Header, format!("header json: {}", e))
        })?;

        let kid = match &header.kid {
            Some(Value::String(kid)) if !kid.is_empty() => kid.clone(),
            None | Some(Value::String(_)) => {
                return Err(AuthError::malformed(TokenStage::Body, "kid missing"))
            }
            Some(_) => return Err(AuthError::malformed(TokenStage::Body, "kid is not a string")),
        };

        let signature = B64URL.decode(signature_segment).map_err(|e| {
            AuthError::malformed(TokenStage::Body, format!("signature encoding: {}", e))
        })?;

        Ok(Self {
            header,
            kid,
            signing_input,
            payload,
            signature,
        })
    }

    pub fn header(&self) -> &TokenHeader {
        &self.header
    }

    /// Key identifier from the header
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// `header_b64 + "." + payload_b64`, the exact bytes that were signed
    pub fn signing_input(&self) -> &'a str {
        self.signing_input
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Only the verifier calls this, after the signature checked out.
    pub(crate) fn into_verified(self) -> VerifiedToken<'a> {
        VerifiedToken {
            header: self.header,
            payload: self.payload,
        }
    }
}

/// A token whose signature has been verified against a published key
#[derive(Debug)]
pub struct VerifiedToken<'a> {
    header: TokenHeader,
    payload: &'a str,
}

impl VerifiedToken<'_> {
    pub fn header(&self) -> &TokenHeader {
        &self.header
    }

    /// Decode the payload into a claims object
    ///
    /// # Errors
    ///
    /// `ClaimShape` if the payload is not base64url-encoded JSON object.
    pub fn claims(&self) -> Result<Claims, AuthError> {
        let bytes = B64URL
            .decode(self.payload)
            .map_err(|e| AuthError::ClaimShape(format!("payload encoding: {}", e)))?;
        let map: serde_json::Map<String, Value> = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::ClaimShape(format!("payload json: {}", e)))?;
        Ok(Claims::new(map))
    }
}
