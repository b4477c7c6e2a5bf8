//! Signature verification
//!
//! Resolves the algorithm for a key and checks the signature over the exact
//! signing input. A mismatch is an error like any other failure, so callers
//! never have to reconcile a `false` with an `Err`.

use super::jwks::{asymmetric_algorithm, Jwk};
use super::token::{UnverifiedToken, VerifiedToken, B64URL};
use super::AuthError;
use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey};
use tracing::warn;

/// Verify a parsed token against the key its header selected
///
/// # Errors
///
/// `InvalidSignature` on a cryptographic mismatch or an algorithm the key
/// cannot be used with; `KeyFetch` if the key material itself is unusable.
pub fn verify<'a>(token: UnverifiedToken<'a>, key: &Jwk) -> Result<VerifiedToken<'a>, AuthError> {
    let algorithm = resolve_algorithm(key, token.header().alg.as_deref())?;
    let decoding_key = key.to_decoding_key()?;

    verify_signature(
        token.signing_input().as_bytes(),
        token.signature(),
        &decoding_key,
        algorithm,
    )?;

    Ok(token.into_verified())
}

/// Check `signature` over `signing_input` with an already-built key
pub fn verify_signature(
    signing_input: &[u8],
    signature: &[u8],
    key: &DecodingKey,
    algorithm: Algorithm,
) -> Result<(), AuthError> {
    let encoded = B64URL.encode(signature);
    match jsonwebtoken::crypto::verify(&encoded, signing_input, key, algorithm) {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!(algorithm = ?algorithm, "Signature verification failed");
            Err(AuthError::InvalidSignature)
        }
        Err(e) => {
            warn!(algorithm = ?algorithm, error = %e, "Signature could not be checked");
            Err(AuthError::InvalidSignature)
        }
    }
}

/// Pick the algorithm for `key`
///
/// The key's declared `alg` is authoritative. Without one, the header's
/// `alg` is used. Either way the algorithm must be asymmetric and belong to
/// the key's type.
pub fn resolve_algorithm(key: &Jwk, header_alg: Option<&str>) -> Result<Algorithm, AuthError> {
    let algorithm = match (key.alg.as_deref(), header_alg) {
        (Some(declared), Some(requested)) if declared != requested => {
            warn!(declared, requested, "Token algorithm does not match key");
            return Err(AuthError::InvalidSignature);
        }
        (Some(name), _) | (None, Some(name)) => asymmetric_algorithm(name),
        (None, None) => None,
    };

    let algorithm = algorithm.ok_or_else(|| {
        warn!(alg = ?key.alg.as_deref().or(header_alg), "Unsupported signature algorithm");
        AuthError::InvalidSignature
    })?;

    let compatible = match algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => key.kty == "RSA",
        Algorithm::ES256 | Algorithm::ES384 => key.kty == "EC",
        _ => false,
    };
    if !compatible {
        warn!(kty = %key.kty, algorithm = ?algorithm, "Algorithm does not fit key type");
        return Err(AuthError::InvalidSignature);
    }

    Ok(algorithm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwks::KeySet;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const JWKS: &str = include_str!("../../tests/fixtures/jwks.json");
    const RSA_PRIVATE_KEY: &str = include_str!("../../tests/fixtures/rsa_signing_key.pem");
    const RSA_ROTATED_KEY: &str = include_str!("../../tests/fixtures/rsa_rotated_key.pem");
    const EC_PRIVATE_KEY: &str = include_str!("../../tests/fixtures/ec_signing_key.pem");

    fn key_set() -> KeySet {
        KeySet::from_json(JWKS).unwrap()
    }

    fn sign_rs256(pem: &str, kid: &str) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(
            &header,
            &json!({"sub": "user123", "exp": 4_000_000_000u64}),
            &EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_rs256_signature() {
        let keys = key_set();
        let raw = sign_rs256(RSA_PRIVATE_KEY, "signing-key-1");
        let token = UnverifiedToken::parse(&raw).unwrap();
        let jwk = keys.find(token.kid()).unwrap();

        let verified = verify(token, jwk).unwrap();
        assert_eq!(verified.claims().unwrap().get_str("sub"), Some("user123"));
    }

    #[test]
    fn test_valid_es256_signature() {
        let keys = key_set();
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some("ec-key-1".to_string());
        let raw = encode(
            &header,
            &json!({"sub": "ec-user"}),
            &EncodingKey::from_ec_pem(EC_PRIVATE_KEY.as_bytes()).unwrap(),
        )
        .unwrap();

        let token = UnverifiedToken::parse(&raw).unwrap();
        let jwk = keys.find(token.kid()).unwrap();
        assert!(verify(token, jwk).is_ok());
    }

    #[test]
    fn test_wrong_key_signature_rejected() {
        let keys = key_set();
        // Signed by a key the issuer never published, under a published kid
        let raw = sign_rs256(RSA_ROTATED_KEY, "signing-key-1");
        let token = UnverifiedToken::parse(&raw).unwrap();
        let jwk = keys.find(token.kid()).unwrap();

        assert!(matches!(verify(token, jwk), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let keys = key_set();
        let raw = sign_rs256(RSA_PRIVATE_KEY, "signing-key-1");
        let parts: Vec<&str> = raw.split('.').collect();

        let mut payload = B64URL.decode(parts[1]).unwrap();
        payload[2] ^= 0x01;
        let tampered = format!("{}.{}.{}", parts[0], B64URL.encode(&payload), parts[2]);

        let token = UnverifiedToken::parse(&tampered).unwrap();
        let jwk = keys.find(token.kid()).unwrap();
        assert!(matches!(verify(token, jwk), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_header_algorithm_must_match_key() {
        let keys = key_set();
        let jwk = keys.find("signing-key-1").unwrap();
        assert!(matches!(
            resolve_algorithm(jwk, Some("RS512")),
            Err(AuthError::InvalidSignature)
        ));
        assert_eq!(resolve_algorithm(jwk, Some("RS256")).unwrap(), Algorithm::RS256);
        assert_eq!(resolve_algorithm(jwk, None).unwrap(), Algorithm::RS256);
    }

    #[test]
    fn test_header_algorithm_used_when_key_has_none() {
        let mut jwk = key_set().find("signing-key-1").unwrap().clone();
        jwk.alg = None;
        assert_eq!(resolve_algorithm(&jwk, Some("PS256")).unwrap(), Algorithm::PS256);
        assert!(matches!(
            resolve_algorithm(&jwk, None),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_hmac_and_none_rejected() {
        let mut jwk = key_set().find("signing-key-1").unwrap().clone();
        jwk.alg = None;
        for alg in ["HS256", "none"] {
            assert!(matches!(
                resolve_algorithm(&jwk, Some(alg)),
                Err(AuthError::InvalidSignature)
            ));
        }
    }

    #[test]
    fn test_algorithm_family_must_fit_key_type() {
        let mut jwk = key_set().find("signing-key-1").unwrap().clone();
        jwk.alg = Some("ES256".into());
        assert!(matches!(
            resolve_algorithm(&jwk, None),
            Err(AuthError::InvalidSignature)
        ));
    }
}
