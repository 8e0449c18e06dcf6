//! `Link` header pagination.
//!
//! List endpoints return at most one page per response and advertise the
//! following page through an RFC 8288 `Link` header entry with `rel="next"`.

use std::sync::LazyLock;

use regex::Regex;

/// Page size requested from list endpoints.
pub const PAGE_LIMIT: u32 = 100;

/// Upper bound on pages followed by a single list call.
pub const MAX_PAGES: usize = 10_000;

#[allow(clippy::expect_used)]
static LINK_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([^>]*)>\s*((?:;\s*[^;,]+)*)").expect("link entry regex is valid")
});

#[allow(clippy::expect_used)]
static REL_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)rel\s*=\s*"?([^";]+)"?"#).expect("rel param regex is valid")
});

/// Extracts the `rel="next"` target from a `Link` header value.
///
/// Returns `None` when no entry carries the `next` relation.
#[must_use]
pub fn next_link(header_value: &str) -> Option<String> {
    LINK_ENTRY.captures_iter(header_value).find_map(|entry| {
        let target = entry.get(1)?.as_str().trim();
        let params = entry.get(2).map_or("", |m| m.as_str());
        let is_next = REL_PARAM.captures_iter(params).any(|rel| {
            rel.get(1).is_some_and(|value| {
                value
                    .as_str()
                    .split_whitespace()
                    .any(|r| r.eq_ignore_ascii_case("next"))
            })
        });
        (is_next && !target.is_empty()).then(|| target.to_string())
    })
}
