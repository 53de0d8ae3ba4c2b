//! PKCE (RFC 7636) verification. Only the S256 method is supported; a code
//! exchange succeeds iff `base64url_nopad(SHA-256(verifier))` equals the
//! challenge the code was bound to.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

use super::token::constant_time_eq;

pub const PKCE_METHOD_S256: &str = "S256";

/// RFC 7636 length bounds for the code verifier.
pub const CODE_VERIFIER_MIN_LENGTH: usize = 43;
pub const CODE_VERIFIER_MAX_LENGTH: usize = 128;

/// `code_challenge = BASE64URL-NOPAD(SHA256(code_verifier))`
pub fn compute_s256_challenge(code_verifier: &str) -> String {
    let digest = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Constant-time check of a verifier against the stored challenge.
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    constant_time_eq(&compute_s256_challenge(code_verifier), code_challenge)
}

/// 43..=128 characters from the unreserved URI set.
pub fn validate_code_verifier(verifier: &str) -> bool {
    let len = verifier.len();
    if !(CODE_VERIFIER_MIN_LENGTH..=CODE_VERIFIER_MAX_LENGTH).contains(&len) {
        return false;
    }
    verifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}

/// An S256 challenge is exactly 43 base64url characters (32 hashed bytes).
pub fn validate_code_challenge(challenge: &str) -> bool {
    challenge.len() == 43
        && challenge
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
}
