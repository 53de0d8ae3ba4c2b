use uuid::Uuid;

/// A registered WebAuthn public-key credential.
///
/// `sign_count` is monotone non-decreasing; an assertion that reports a
/// lower counter marks the credential with `clone_warning` instead of
/// silently accepting the regression. `passkey` is the serialized
/// verifier-side credential used to validate assertions.
#[derive(Debug, Clone)]
pub struct WebAuthnCredential {
    pub credential_id: Vec<u8>,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub public_key: Vec<u8>,
    pub attestation_type: String,
    pub aaguid: [u8; 16],
    pub sign_count: u32,
    pub clone_warning: bool,
    pub passkey: serde_json::Value,
}
