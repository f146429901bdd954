//! Default User-Agent for new sessions.

/// Project URL for User-Agent identification (RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/fetcher";

/// User-Agent seeded into every session unless the caller supplies one.
#[must_use]
pub(crate) fn default_session_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("fetcher/{version} (+{PROJECT_UA_URL})")
}
