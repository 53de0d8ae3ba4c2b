pub mod auth;
pub mod clients;
pub mod device;
pub mod mfa;
pub mod oauth;
pub mod webauthn;
