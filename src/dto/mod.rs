pub mod auth;
pub mod device;
pub mod mfa;
pub mod oauth;
pub mod webauthn;
