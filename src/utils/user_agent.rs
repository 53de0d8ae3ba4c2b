//! Best-effort OS version extraction from a `User-Agent` header.
//!
//! Device registration during login prefers the version the client reports
//! explicitly; this parser only backfills when that hint is absent.

use regex::Regex;
use std::sync::OnceLock;

fn os_version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(?:windows nt|mac os x|iphone os|cpu os|android)[ /]([0-9]+(?:[._][0-9]+)*)",
        )
        .expect("user agent pattern")
    })
}

/// Returns a dotted version string when one is recognizable.
pub fn os_version_from_user_agent(user_agent: &str) -> Option<String> {
    os_version_pattern()
        .captures(user_agent)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().replace('_', "."))
}
