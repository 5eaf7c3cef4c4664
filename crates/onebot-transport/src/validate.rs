//! Target URL validation for the client transports.

use url::Url;

fn has_scheme(raw: &str, schemes: &[&str]) -> bool {
    match Url::parse(raw) {
        Ok(url) => {
            schemes.contains(&url.scheme()) && url.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}

/// Returns `true` for a well-formed absolute `http`/`https` URL.
pub fn is_valid_http_url(raw: &str) -> bool {
    has_scheme(raw, &["http", "https"])
}

/// Returns `true` for a well-formed absolute `ws`/`wss` URL.
pub fn is_valid_ws_url(raw: &str) -> bool {
    has_scheme(raw, &["ws", "wss"])
}
