//! Session cookie framing.
//!
//! Successful logins set two HttpOnly, SameSite=Strict cookies: the access
//! token on `/` with a one-hour age, and the refresh token on
//! `/oauth2/token` with a seven-day age. `Secure` is added in production.
//! Logout re-sets both with `Max-Age=0`.

use crate::keys::ACCESS_TOKEN_TTL_SECS;
use crate::models::refresh::REFRESH_TOKEN_TTL_SECS;

pub const ACCESS_COOKIE: &str = "wardseal_access";
pub const REFRESH_COOKIE: &str = "wardseal_refresh";

const REFRESH_PATH: &str = "/oauth2/token";

fn build(name: &str, value: &str, path: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{name}={value}; Path={path}; Max-Age={max_age}; HttpOnly; SameSite=Strict"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn access_cookie(token: &str, secure: bool) -> String {
    build(ACCESS_COOKIE, token, "/", ACCESS_TOKEN_TTL_SECS, secure)
}

pub fn refresh_cookie(token: &str, secure: bool) -> String {
    build(
        REFRESH_COOKIE,
        token,
        REFRESH_PATH,
        REFRESH_TOKEN_TTL_SECS,
        secure,
    )
}

pub fn clear_access_cookie(secure: bool) -> String {
    build(ACCESS_COOKIE, "", "/", 0, secure)
}

pub fn clear_refresh_cookie(secure: bool) -> String {
    build(REFRESH_COOKIE, "", REFRESH_PATH, 0, secure)
}

/// Pull one cookie value out of a raw `Cookie` request header.
pub fn read_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then_some(v)
    })
}
