//! ID-token validation.
//!
//! The provider's signing setup decides the shape of the validator: HMAC
//! algorithms verify against a key derived from the client secret, every
//! other algorithm verifies against the provider's published JWKS, fetched
//! on demand. Both shapes enforce signature, issuer, audience, expiry, and
//! the nonce bound to the pending login.

use std::str::FromStr;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::error::{OidcError, Result};

/// HMAC verification keys shorter than this are zero-padded up to it.
const MIN_HMAC_KEY_BYTES: usize = 32;

/// Clock skew tolerated when checking time-based claims.
const VALIDATION_LEEWAY_SECONDS: u64 = 60;

/// Parse a JWS algorithm name, case-insensitively.
pub(crate) fn parse_algorithm(name: &str) -> Result<Algorithm> {
    Algorithm::from_str(&name.to_uppercase())
        .map_err(|_| OidcError::Configuration(format!("unsupported JWS algorithm '{name}'")))
}

/// Whether the algorithm belongs to the symmetric (HMAC) family.
pub(crate) fn is_hmac(algorithm: Algorithm) -> bool {
    matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Claims carried by a validated ID token.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer identifier.
    pub iss: String,
    /// Subject: the provider's identifier for the authenticated user.
    pub sub: String,
    /// Audience; string or array on the wire.
    pub aud: Audience,
    /// Expiration time (Unix seconds).
    pub exp: u64,
    /// Issued-at time (Unix seconds).
    #[serde(default)]
    pub iat: Option<u64>,
    /// Nonce echoing the value sent in the login URL.
    #[serde(default)]
    pub nonce: Option<String>,
    /// Email address, when the provider releases it.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name, when the provider releases it.
    #[serde(default)]
    pub name: Option<String>,
    /// Preferred username, when the provider releases it.
    #[serde(default)]
    pub preferred_username: Option<String>,
}

/// The `aud` claim: a single client id or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// Single audience value.
    One(String),
    /// Multiple audience values.
    Many(Vec<String>),
}

/// JSON Web Key Set as published at the provider's `jwks_uri`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JwkSet {
    pub(crate) keys: Vec<Jwk>,
}

impl JwkSet {
    fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid.as_deref() == Some(kid))
    }
}

/// One published signing key. RSA keys carry `n`/`e`, EC keys `x`/`y`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Jwk {
    pub(crate) kty: String,
    #[serde(default)]
    pub(crate) kid: Option<String>,
    #[serde(default)]
    pub(crate) n: Option<String>,
    #[serde(default)]
    pub(crate) e: Option<String>,
    #[serde(default)]
    pub(crate) x: Option<String>,
    #[serde(default)]
    pub(crate) y: Option<String>,
}

impl Jwk {
    fn decoding_key(&self) -> Result<DecodingKey> {
        match self.kty.as_str() {
            "RSA" => {
                let (n, e) = self
                    .n
                    .as_deref()
                    .zip(self.e.as_deref())
                    .ok_or_else(|| missing_components("RSA", "n/e"))?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|err| OidcError::TokenValidation(format!("invalid RSA key: {err}")))
            }
            "EC" => {
                let (x, y) = self
                    .x
                    .as_deref()
                    .zip(self.y.as_deref())
                    .ok_or_else(|| missing_components("EC", "x/y"))?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|err| OidcError::TokenValidation(format!("invalid EC key: {err}")))
            }
            other => {
                Err(OidcError::TokenValidation(format!("unsupported signing key type '{other}'")))
            }
        }
    }
}

fn missing_components(kty: &str, components: &str) -> OidcError {
    OidcError::TokenValidation(format!("{kty} signing key is missing its {components} components"))
}

/// Validator for ID tokens, built once per loaded provider.
pub enum IdTokenValidator {
    /// Symmetric verification against the (padded) client secret.
    Hmac { key: Vec<u8>, algorithm: Algorithm, issuer: String, audience: String },
    /// Asymmetric verification against keys fetched from the provider's
    /// JWKS endpoint on demand.
    Jwks { jwks_uri: Url, http: Client, algorithm: Algorithm, issuer: String, audience: String },
}

impl IdTokenValidator {
    /// Build a symmetric validator from the client secret.
    ///
    /// Secrets shorter than 32 bytes are zero-padded; HMAC treats a
    /// zero-padded key identically to the raw short key, so tokens signed
    /// with either verify the same.
    pub fn hmac(
        client_secret: &str,
        algorithm: Algorithm,
        issuer: String,
        audience: String,
    ) -> Self {
        let mut key = client_secret.as_bytes().to_vec();
        if key.len() < MIN_HMAC_KEY_BYTES {
            warn!(
                length = key.len(),
                "client secret is shorter than 32 bytes (256 bits), padding the validation key"
            );
            key.resize(MIN_HMAC_KEY_BYTES, 0);
        }
        Self::Hmac { key, algorithm, issuer, audience }
    }

    /// Build an asymmetric validator bound to a JWKS endpoint.
    pub fn jwks(
        jwks_uri: Url,
        http: Client,
        algorithm: Algorithm,
        issuer: String,
        audience: String,
    ) -> Self {
        Self::Jwks { jwks_uri, http, algorithm, issuer, audience }
    }

    /// Validate a raw ID token and return its claims.
    ///
    /// # Errors
    /// `TokenValidation` on any signature, issuer, audience, expiry, or
    /// nonce mismatch, and on JWKS fetch failures.
    pub async fn validate(&self, token: &str, expected_nonce: &str) -> Result<IdTokenClaims> {
        let claims = match self {
            Self::Hmac { key, algorithm, issuer, audience } => {
                decode_claims(token, &DecodingKey::from_secret(key), *algorithm, issuer, audience)?
            }
            Self::Jwks { jwks_uri, http, algorithm, issuer, audience } => {
                let header = decode_header(token).map_err(|err| {
                    OidcError::TokenValidation(format!("unreadable token header: {err}"))
                })?;
                if header.alg != *algorithm {
                    return Err(OidcError::TokenValidation(format!(
                        "token signed with {:?}, expected {:?}",
                        header.alg, algorithm
                    )));
                }
                let key_set = fetch_jwks(http, jwks_uri).await?;
                let key = select_key(&key_set, header.kid.as_deref())?.decoding_key()?;
                decode_claims(token, &key, *algorithm, issuer, audience)?
            }
        };

        match claims.nonce.as_deref() {
            Some(nonce) if nonce == expected_nonce => {}
            Some(_) => {
                return Err(OidcError::TokenValidation(
                    "nonce does not match the pending login".to_string(),
                ))
            }
            None => {
                return Err(OidcError::TokenValidation(
                    "ID token carries no nonce claim".to_string(),
                ))
            }
        }

        info!(subject = %claims.sub, "valid ID token received");
        Ok(claims)
    }
}

fn decode_claims(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
    issuer: &str,
    audience: &str,
) -> Result<IdTokenClaims> {
    let mut validation = Validation::new(algorithm);
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);
    validation.leeway = VALIDATION_LEEWAY_SECONDS;

    let data = decode::<IdTokenClaims>(token, key, &validation)
        .map_err(|err| OidcError::TokenValidation(err.to_string()))?;
    Ok(data.claims)
}

async fn fetch_jwks(http: &Client, jwks_uri: &Url) -> Result<JwkSet> {
    let response = http.get(jwks_uri.clone()).send().await.map_err(|err| {
        OidcError::TokenValidation(format!("unable to fetch signing keys from '{jwks_uri}': {err}"))
    })?;
    if !response.status().is_success() {
        return Err(OidcError::TokenValidation(format!(
            "signing key endpoint '{jwks_uri}' returned status {}",
            response.status()
        )));
    }
    response.json().await.map_err(|err| {
        OidcError::TokenValidation(format!("invalid key set from '{jwks_uri}': {err}"))
    })
}

fn select_key<'a>(key_set: &'a JwkSet, kid: Option<&str>) -> Result<&'a Jwk> {
    match kid {
        Some(kid) => key_set
            .find(kid)
            .ok_or_else(|| OidcError::TokenValidation(format!("no signing key with kid '{kid}'"))),
        None if key_set.keys.len() == 1 => Ok(&key_set.keys[0]),
        None => Err(OidcError::TokenValidation(
            "token header carries no kid and the provider publishes multiple keys".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    use super::*;

    const ISSUER: &str = "https://sso.example.com/realms/test";
    const AUDIENCE: &str = "test-client";
    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[derive(Serialize)]
    struct TestClaims {
        iss: String,
        sub: String,
        aud: String,
        exp: u64,
        iat: u64,
        nonce: String,
    }

    fn mint_hs256(secret: &str, issuer: &str, audience: &str, nonce: &str) -> String {
        let now = Utc::now().timestamp() as u64;
        let claims = TestClaims {
            iss: issuer.to_string(),
            sub: "user-1".to_string(),
            aud: audience.to_string(),
            exp: now + 600,
            iat: now,
            nonce: nonce.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
            .expect("token")
    }

    fn hmac_validator(secret: &str) -> IdTokenValidator {
        IdTokenValidator::hmac(secret, Algorithm::HS256, ISSUER.to_string(), AUDIENCE.to_string())
    }

    #[test]
    fn algorithm_parsing_is_case_insensitive() {
        assert!(matches!(parse_algorithm("hs256"), Ok(Algorithm::HS256)));
        assert!(matches!(parse_algorithm("RS256"), Ok(Algorithm::RS256)));
        assert!(matches!(parse_algorithm("bogus"), Err(OidcError::Configuration(_))));
    }

    #[test]
    fn hmac_family_detection() {
        assert!(is_hmac(Algorithm::HS256));
        assert!(is_hmac(Algorithm::HS512));
        assert!(!is_hmac(Algorithm::RS256));
        assert!(!is_hmac(Algorithm::ES256));
    }

    #[test]
    fn short_secret_is_padded_to_minimum_length() {
        let validator = IdTokenValidator::hmac(
            "short",
            Algorithm::HS256,
            ISSUER.to_string(),
            AUDIENCE.to_string(),
        );
        match validator {
            IdTokenValidator::Hmac { key, .. } => {
                assert_eq!(key.len(), MIN_HMAC_KEY_BYTES);
                assert!(key.starts_with(b"short"));
            }
            IdTokenValidator::Jwks { .. } => panic!("expected HMAC validator"),
        }
    }

    #[tokio::test]
    async fn valid_hs256_token_passes() {
        let token = mint_hs256(SECRET, ISSUER, AUDIENCE, "nonce-1");
        let claims = hmac_validator(SECRET).validate(&token, "nonce-1").await.expect("claims");

        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.nonce.as_deref(), Some("nonce-1"));
    }

    #[tokio::test]
    async fn token_signed_with_short_secret_still_verifies_after_padding() {
        // HMAC zero-pads short keys itself, so signing with the raw short
        // secret and verifying with the padded key must agree.
        let token = mint_hs256("short", ISSUER, AUDIENCE, "nonce-1");
        let claims = hmac_validator("short").validate(&token, "nonce-1").await.expect("claims");
        assert_eq!(claims.sub, "user-1");
    }

    #[tokio::test]
    async fn nonce_mismatch_is_rejected() {
        let token = mint_hs256(SECRET, ISSUER, AUDIENCE, "nonce-1");
        let result = hmac_validator(SECRET).validate(&token, "other-nonce").await;
        assert!(matches!(result, Err(OidcError::TokenValidation(_))));
    }

    #[tokio::test]
    async fn wrong_issuer_is_rejected() {
        let token = mint_hs256(SECRET, "https://evil.example.com", AUDIENCE, "nonce-1");
        let result = hmac_validator(SECRET).validate(&token, "nonce-1").await;
        assert!(matches!(result, Err(OidcError::TokenValidation(_))));
    }

    #[tokio::test]
    async fn wrong_audience_is_rejected() {
        let token = mint_hs256(SECRET, ISSUER, "other-client", "nonce-1");
        let result = hmac_validator(SECRET).validate(&token, "nonce-1").await;
        assert!(matches!(result, Err(OidcError::TokenValidation(_))));
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let token = mint_hs256(SECRET, ISSUER, AUDIENCE, "nonce-1");
        let tampered = format!("{}x", token);
        let result = hmac_validator(SECRET).validate(&tampered, "nonce-1").await;
        assert!(matches!(result, Err(OidcError::TokenValidation(_))));
    }

    #[test]
    fn audience_claim_accepts_string_and_array() {
        let single: Audience = serde_json::from_str("\"client-a\"").expect("single");
        assert!(matches!(single, Audience::One(ref value) if value == "client-a"));

        let many: Audience = serde_json::from_str("[\"client-a\", \"client-b\"]").expect("many");
        assert!(matches!(many, Audience::Many(ref values) if values.len() == 2));
    }

    #[test]
    fn unsupported_key_type_is_rejected() {
        let key = Jwk {
            kty: "oct".to_string(),
            kid: Some("k1".to_string()),
            n: None,
            e: None,
            x: None,
            y: None,
        };
        assert!(matches!(key.decoding_key(), Err(OidcError::TokenValidation(_))));
    }

    #[test]
    fn rsa_key_without_components_is_rejected() {
        let key =
            Jwk { kty: "RSA".to_string(), kid: None, n: None, e: None, x: None, y: None };
        assert!(matches!(key.decoding_key(), Err(OidcError::TokenValidation(_))));
    }

    #[test]
    fn key_selection_prefers_kid_and_tolerates_single_key_sets() {
        let set: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [
                { "kty": "RSA", "kid": "a", "n": "AQAB", "e": "AQAB" },
                { "kty": "RSA", "kid": "b", "n": "AQAB", "e": "AQAB" }
            ]
        }))
        .expect("key set");

        assert_eq!(select_key(&set, Some("b")).expect("kid b").kid.as_deref(), Some("b"));
        assert!(matches!(select_key(&set, Some("missing")), Err(OidcError::TokenValidation(_))));
        assert!(matches!(select_key(&set, None), Err(OidcError::TokenValidation(_))));

        let single: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [ { "kty": "RSA", "kid": "only", "n": "AQAB", "e": "AQAB" } ]
        }))
        .expect("key set");
        assert_eq!(select_key(&single, None).expect("single").kid.as_deref(), Some("only"));
    }
}
