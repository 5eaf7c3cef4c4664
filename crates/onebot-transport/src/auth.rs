//! Access-token checks and the protocol headers sent to consumers.

use onebot_core::ONEBOT_VERSION;

pub const HEADER_ONEBOT_VERSION: &str = "X-OneBot-Version";
pub const HEADER_IMPL: &str = "X-Impl";
pub const QUERY_ACCESS_TOKEN: &str = "access_token";

/// `User-Agent` for outbound requests.
pub fn user_agent() -> String {
    format!("OneBot/{ONEBOT_VERSION} onebot-rs/{}", env!("CARGO_PKG_VERSION"))
}

/// Protocol headers attached to every outbound connection or request.
pub fn protocol_headers(platform: &str) -> [(&'static str, String); 3] {
    [
        ("User-Agent", user_agent()),
        (HEADER_ONEBOT_VERSION, ONEBOT_VERSION.to_string()),
        (HEADER_IMPL, platform.to_string()),
    ]
}

/// Extracts the token of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(authorization: &str) -> Option<&str> {
    let (scheme, token) = authorization.trim().split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

/// Extracts the `access_token` query parameter.
pub fn query_token(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == QUERY_ACCESS_TOKEN)
        .map(|(_, value)| value.into_owned())
}

/// Checks an inbound request against the configured token.
///
/// Requests always pass when no token is configured. Otherwise the bearer
/// header is checked first, then the `access_token` query parameter.
pub fn authorize(expected: Option<&str>, authorization: Option<&str>, query: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };

    if let Some(token) = authorization.and_then(bearer_token) {
        return token == expected;
    }

    query
        .and_then(query_token)
        .is_some_and(|token| token == expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_token_configured() {
        assert!(authorize(None, None, None));
        assert!(authorize(None, Some("Bearer whatever"), None));
    }

    #[test]
    fn test_bearer_header() {
        assert!(authorize(Some("t0k"), Some("Bearer t0k"), None));
        assert!(authorize(Some("t0k"), Some("bearer t0k"), None));
        assert!(!authorize(Some("t0k"), Some("Bearer nope"), None));
        assert!(!authorize(Some("t0k"), None, None));
    }

    #[test]
    fn test_query_parameter() {
        assert!(authorize(Some("a b"), None, Some("x=1&access_token=a%20b")));
        assert!(!authorize(Some("t0k"), None, Some("access_token=nope")));
        assert!(!authorize(Some("t0k"), None, Some("token=t0k")));
    }

    #[test]
    fn test_protocol_headers() {
        let headers = protocol_headers("qq");
        assert!(headers[0].1.starts_with("OneBot/12"));
        assert_eq!(headers[1], (HEADER_ONEBOT_VERSION, "12".to_string()));
        assert_eq!(headers[2], (HEADER_IMPL, "qq".to_string()));
    }
}
