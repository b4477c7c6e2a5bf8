//! Shared helpers for integration tests: fixture keys and token minting

#![allow(dead_code)]

use chat_gate::auth::{ClaimsPolicy, JwtAuthenticator, StaticKeyStore};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;

pub const ISSUER: &str = "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_example";
pub const CLIENT_ID: &str = "test-client-id";

pub const JWKS: &str = include_str!("../fixtures/jwks.json");
pub const JWKS_ROTATED: &str = include_str!("../fixtures/jwks_rotated.json");
pub const RSA_KEY: &str = include_str!("../fixtures/rsa_signing_key.pem");
pub const RSA_ROTATED_KEY: &str = include_str!("../fixtures/rsa_rotated_key.pem");
pub const EC_KEY: &str = include_str!("../fixtures/ec_signing_key.pem");

pub const RSA_KID: &str = "signing-key-1";
pub const ROTATED_KID: &str = "signing-key-2";
pub const EC_KID: &str = "ec-key-1";

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims of a valid access token for `sub`
pub fn access_claims(sub: &str) -> Value {
    let now = now();
    json!({
        "sub": sub,
        "username": format!("{}-name", sub),
        "iss": ISSUER,
        "client_id": CLIENT_ID,
        "token_use": "access",
        "scope": "aws.cognito.signin.user.admin",
        "exp": now + 3600,
        "iat": now,
        "jti": uuid::Uuid::new_v4().to_string(),
        "auth_time": now,
    })
}

/// Sign `claims` with the RSA fixture key under `kid`
pub fn sign_rs256(pem: &str, kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(pem.as_bytes()).expect("valid RSA fixture"),
    )
    .expect("token encodes")
}

/// Sign `claims` with the EC fixture key
pub fn sign_es256(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(EC_KID.to_string());
    encode(
        &header,
        claims,
        &EncodingKey::from_ec_pem(EC_KEY.as_bytes()).expect("valid EC fixture"),
    )
    .expect("token encodes")
}

/// Valid RS256 access token for `sub`
pub fn access_token(sub: &str) -> String {
    sign_rs256(RSA_KEY, RSA_KID, &access_claims(sub))
}

/// Pipeline over the fixture key set, reading bearer tokens
pub fn authenticator() -> JwtAuthenticator {
    let keys = StaticKeyStore::from_json(JWKS).expect("valid JWKS fixture");
    JwtAuthenticator::new(Arc::new(keys), ClaimsPolicy::new(ISSUER, CLIENT_ID))
}
