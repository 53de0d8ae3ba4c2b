//! Process-wide signing key and JWKS publication.
//!
//! One RSA key is active per process: either loaded from a PEM file at
//! startup or freshly generated (2048-bit). The key never mutates after
//! construction; `AppState` holds it behind an `Arc`. The `kid` is derived
//! from the SHA-256 of the public-key DER, so a persisted key keeps the same
//! `kid` across restarts and every token it ever signed keeps resolving in
//! the published JWKS.

use anyhow::Context;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::SubjectType;

pub const ISSUER: &str = "identity-platform";
pub const AUDIENCE: &str = "client-app";

/// Access tokens live one hour.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

const RSA_BITS: usize = 2048;

/// Claim set carried by every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub scope: String,
    pub tenant: String,
    pub subject_type: SubjectType,
}

impl AccessClaims {
    pub fn issued_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.iat, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.tenant).ok()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Jwk {
    pub kty: &'static str,
    #[serde(rename = "use")]
    pub use_: &'static str,
    pub alg: &'static str,
    pub kid: String,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// The active signing key plus everything derived from it.
pub struct KeyMaterial {
    kid: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    jwks: JwksDocument,
}

impl KeyMaterial {
    /// Load the key named by `path`, or generate a fresh one when no path is
    /// configured. A configured-but-unreadable key is fatal.
    pub fn load_or_generate(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let pem = std::fs::read_to_string(path)
                    .with_context(|| format!("reading signing key from {path}"))?;
                Self::from_pem(&pem)
            }
            None => Self::generate(),
        }
    }

    pub fn generate() -> anyhow::Result<Self> {
        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, RSA_BITS)
            .context("generating RSA signing key")?;
        Self::from_private_key(private)
    }

    /// Accepts PKCS#8 (`BEGIN PRIVATE KEY`) and PKCS#1 (`BEGIN RSA PRIVATE KEY`).
    pub fn from_pem(pem: &str) -> anyhow::Result<Self> {
        let private = if pem.contains("BEGIN RSA PRIVATE KEY") {
            RsaPrivateKey::from_pkcs1_pem(pem).context("parsing PKCS#1 signing key")?
        } else {
            RsaPrivateKey::from_pkcs8_pem(pem).context("parsing PKCS#8 signing key")?
        };
        Self::from_private_key(private)
    }

    fn from_private_key(private: RsaPrivateKey) -> anyhow::Result<Self> {
        let public = private.to_public_key();

        let public_der = public
            .to_public_key_der()
            .context("encoding public key")?;
        let digest = Sha256::digest(public_der.as_bytes());
        let kid = hex::encode(&digest[..8]);

        let n = URL_SAFE_NO_PAD.encode(public.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public.e().to_bytes_be());

        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .context("encoding private key")?;
        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .context("encoding public key")?;

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .context("building JWT encoding key")?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .context("building JWT decoding key")?;

        let jwks = JwksDocument {
            keys: vec![Jwk {
                kty: "RSA",
                use_: "sig",
                alg: "RS256",
                kid: kid.clone(),
                n,
                e,
            }],
        };

        Ok(Self {
            kid,
            encoding_key,
            decoding_key,
            jwks,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn jwks(&self) -> &JwksDocument {
        &self.jwks
    }

    /// Sign an access token for `sub` under `tenant_id`.
    pub fn mint(
        &self,
        sub: &str,
        subject_type: SubjectType,
        tenant_id: Uuid,
        scope: &str,
    ) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: sub.to_string(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            exp: (now + Duration::seconds(ACCESS_TOKEN_TTL_SECS)).timestamp(),
            iat: now.timestamp(),
            scope: scope.to_string(),
            tenant: tenant_id.to_string(),
            subject_type,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());

        encode(&header, &claims, &self.encoding_key).context("signing access token")
    }

    /// Verify signature, expiry, issuer and audience. Any failure collapses
    /// to `invalid_token`; callers that need to fall through (introspection)
    /// match on the error.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.set_audience(&[AUDIENCE]);
        validation.set_issuer(&[ISSUER]);

        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}
