//! Header and cookie plumbing shared by the auth handlers.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, COOKIE, InvalidHeaderValue, USER_AGENT},
};
use std::net::SocketAddr;

use crate::auth::ClientMeta;

pub(crate) const REFRESH_COOKIE_NAME: &str = "sesio_refresh";

/// Extract a client IP: first hop of `x-forwarded-for`, then `x-real-ip`,
/// then the peer socket for direct (unproxied) clients.
pub(crate) fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// Request attribution for attempt, session, and audit rows.
pub(crate) fn extract_client_meta(headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientMeta {
    ClientMeta {
        ip: extract_client_ip(headers, peer),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    }
}

/// Token from an `Authorization: Bearer` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Refresh secret from the session cookie, if present.
pub(crate) fn refresh_cookie(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?.to_str().ok()?;
    for pair in header.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        if key == REFRESH_COOKIE_NAME && !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

/// Build the `HttpOnly` session cookie carrying the refresh secret.
///
/// # Errors
/// Fails when the secret contains bytes illegal in a header value.
pub(crate) fn refresh_cookie_header(
    secret: &str,
    max_age_seconds: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={secret}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Cookie that expires the refresh secret on the client.
pub(crate) fn clear_refresh_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    refresh_cookie_header("", 0, secure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).expect("valid header name"),
                HeaderValue::from_str(value).expect("valid header value"),
            );
        }
        headers
    }

    fn peer() -> SocketAddr {
        "192.0.2.4:55812".parse().expect("valid socket address")
    }

    #[test]
    fn forwarded_for_takes_the_first_hop() {
        let headers = header_map(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);
        assert_eq!(
            extract_client_ip(&headers, Some(peer())),
            Some("203.0.113.9".to_string())
        );
    }

    #[test]
    fn real_ip_is_the_second_choice() {
        let headers = header_map(&[("x-real-ip", "198.51.100.7")]);
        assert_eq!(
            extract_client_ip(&headers, Some(peer())),
            Some("198.51.100.7".to_string())
        );
    }

    #[test]
    fn unproxied_clients_fall_back_to_the_peer_socket() {
        assert_eq!(
            extract_client_ip(&HeaderMap::new(), Some(peer())),
            Some("192.0.2.4".to_string())
        );
        assert_eq!(extract_client_ip(&HeaderMap::new(), None), None);
    }

    #[test]
    fn client_meta_captures_user_agent() {
        let headers = header_map(&[("user-agent", "curl/8"), ("x-real-ip", "198.51.100.7")]);
        let meta = extract_client_meta(&headers, None);
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(meta.ip.as_deref(), Some("198.51.100.7"));
    }

    #[test]
    fn bearer_extraction_requires_the_scheme() {
        let headers = header_map(&[("authorization", "Bearer abc.def.ghi")]);
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi".to_string()));

        let headers = header_map(&[("authorization", "Basic abc")]);
        assert_eq!(bearer_token(&headers), None);

        let headers = header_map(&[("authorization", "Bearer ")]);
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn refresh_cookie_is_found_among_others() {
        let headers = header_map(&[(
            "cookie",
            "theme=dark; sesio_refresh=deadbeef; lang=en",
        )]);
        assert_eq!(refresh_cookie(&headers), Some("deadbeef".to_string()));

        let headers = header_map(&[("cookie", "theme=dark")]);
        assert_eq!(refresh_cookie(&headers), None);
    }

    #[test]
    fn cookie_attributes_match_policy() {
        let cookie = refresh_cookie_header("deadbeef", 2_592_000, true).expect("valid cookie");
        let value = cookie.to_str().expect("ascii");
        assert!(value.starts_with("sesio_refresh=deadbeef; "));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Max-Age=2592000"));
        assert!(value.ends_with("; Secure"));

        let insecure = refresh_cookie_header("deadbeef", 60, false).expect("valid cookie");
        assert!(!insecure.to_str().expect("ascii").contains("Secure"));
    }

    #[test]
    fn clearing_sets_a_zero_max_age() {
        let cookie = clear_refresh_cookie(true).expect("valid cookie");
        let value = cookie.to_str().expect("ascii");
        assert!(value.starts_with("sesio_refresh=; "));
        assert!(value.contains("Max-Age=0"));
    }
}
