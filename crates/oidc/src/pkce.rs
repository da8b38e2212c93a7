//! Random login-attempt material and PKCE (RFC 7636) transforms.
//!
//! State, nonce, and code verifier are all 32 random bytes rendered as
//! base64url without padding (43 characters, within the RFC 7636 43-128
//! verifier bounds). The code challenge is the S256 transform:
//! BASE64URL(SHA256(ASCII(code_verifier))).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

fn random_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..TOKEN_BYTES).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a random state token pairing a callback to its login attempt.
pub fn generate_state() -> String {
    random_token()
}

/// Generate a random nonce bound to the ID token.
pub fn generate_nonce() -> String {
    random_token()
}

/// Generate a PKCE code verifier.
pub fn generate_code_verifier() -> String {
    random_token()
}

/// Compute the S256 code challenge for a verifier.
pub fn code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
