//! Shared User-Agent string for Web API traffic.

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/zotsync";

/// Default User-Agent for remote library requests (identifies the tool).
#[must_use]
pub(crate) fn default_api_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("zotsync/{version} (library-mirror; +{PROJECT_UA_URL})")
}
