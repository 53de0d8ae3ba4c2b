//! WardSeal Authentication Core.
//!
//! A multi-tenant authentication service: password login against an
//! external directory with lockout, risk evaluation and MFA (TOTP,
//! WebAuthn); OAuth 2.1-style authorization-code grants with PKCE,
//! refresh-token rotation, revocation and introspection with Continuous
//! Access Evaluation; RS256 access tokens published through JWKS.

pub mod app;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod keys;
pub mod models;
pub mod services;
pub mod stores;
pub mod tenant;
pub mod utils;
pub mod workers;
