//! Opaque token generation and hashing.
//!
//! Authorization codes and refresh tokens are 32 random bytes rendered as
//! unpadded base64url. Stored lookups go through SHA-256: the stores index
//! the hash, never the secret itself. Client secrets are the exception and
//! use bcrypt, since they are chosen once and verified rarely.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Cost factor for client-secret hashing. Kept above the floor of 10.
pub const BCRYPT_COST: u32 = 12;

const OPAQUE_TOKEN_BYTES: usize = 32;

fn random_urlsafe(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// 256-bit authorization code.
pub fn generate_authorization_code() -> String {
    random_urlsafe(OPAQUE_TOKEN_BYTES)
}

/// 256-bit opaque refresh token.
pub fn generate_refresh_token() -> String {
    random_urlsafe(OPAQUE_TOKEN_BYTES)
}

/// Plaintext secret for a newly registered confidential client. Returned to
/// the caller exactly once; only its bcrypt hash is persisted.
pub fn generate_client_secret() -> String {
    random_urlsafe(48)
}

/// base64url-nopad SHA-256, the index form for codes, refresh tokens and
/// the revocation denylist.
pub fn hash_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

pub fn hash_client_secret(secret: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(secret, BCRYPT_COST)
}

pub fn verify_client_secret(secret: &str, hash: &str) -> bool {
    bcrypt::verify(secret, hash).unwrap_or(false)
}

/// Byte-wise constant-time equality.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_43_urlsafe_chars() {
        let token = generate_refresh_token();
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(generate_authorization_code(), generate_authorization_code());
        assert_ne!(generate_refresh_token(), generate_refresh_token());
    }

    #[test]
    fn hash_is_deterministic_and_not_identity() {
        let token = generate_refresh_token();
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
        assert_eq!(hash_token(&token).len(), 43);
    }

    #[test]
    fn client_secret_roundtrip() {
        let secret = generate_client_secret();
        let hash = hash_client_secret(&secret).unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_client_secret(&secret, &hash));
        assert!(!verify_client_secret("not-the-secret", &hash));
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(constant_time_eq("", ""));
    }
}
