pub mod auth;
pub mod directory;
pub mod oauth;
pub mod risk;
pub mod totp;
pub mod webauthn;

pub use auth::{AuthService, LoginOutcome};
pub use directory::{
    DirectoryAccount, DirectoryClient, DirectoryError, DirectoryUser, HttpDirectoryClient,
};
pub use oauth::OAuthService;
pub use risk::{evaluate_risk, RiskAssessment, RiskLevel};
pub use totp::TotpService;
pub use webauthn::WebAuthnService;
