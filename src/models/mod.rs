pub mod client;
pub mod code;
pub mod device;
pub mod login_attempt;
pub mod refresh;
pub mod revocation;
pub mod totp;
pub mod webauthn;

pub use client::{ClientType, OAuthClient};
pub use code::AuthorizationCode;
pub use device::{Device, SecurityEvent};
pub use login_attempt::LoginAttempt;
pub use refresh::{RefreshTokenRecord, SubjectType};
pub use revocation::RevokedTokenRecord;
pub use totp::TotpEnrollment;
pub use webauthn::WebAuthnCredential;
