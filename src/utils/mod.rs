pub mod cookies;
pub mod pkce;
pub mod token;
pub mod user_agent;
