use std::sync::LazyLock;

use regex::Regex;

/// URL embedded in text immediately followed by a literal `#`. Clip notes use
/// this convention to carry a source link without rendering it.
static HASH_TERMINATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(https?://[^#\s]+)#").expect("hash-terminated URL pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlMode {
    /// The whole (trimmed) text is itself a URL.
    Whole,
    /// First `https?://…` substring immediately followed by `#`.
    HashTerminated,
    /// Last line of the text that starts with `http://` or `https://`.
    TrailingLine,
}

/// Find at most one embedded URL in `text` using the given convention.
/// Pure and side-effect free; first occurrence wins for `HashTerminated`,
/// last line wins for `TrailingLine`.
pub fn find_url(text: &str, mode: UrlMode) -> Option<String> {
    match mode {
        UrlMode::Whole => {
            let trimmed = text.trim();
            if is_http_url(trimmed) {
                Some(trimmed.to_string())
            } else {
                None
            }
        }
        UrlMode::HashTerminated => HASH_TERMINATED
            .captures(text)
            .map(|captures| captures[1].to_string()),
        UrlMode::TrailingLine => text
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| is_http_url(line))
            .map(ToString::to_string),
    }
}

/// Resolve the canonical page URL of a merged clip body: hash-terminated
/// convention first, trailing-line fallback.
pub fn page_url_for(text: &str) -> Option<String> {
    find_url(text, UrlMode::HashTerminated).or_else(|| find_url(text, UrlMode::TrailingLine))
}

fn is_http_url(text: &str) -> bool {
    text.starts_with("http://") || text.starts_with("https://")
}
