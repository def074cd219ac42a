//! Request metadata: refresh-token cookie, bearer header, device info.

use axum::http::{HeaderMap, header};
use chrono::{DateTime, Utc};

use helpdesk_auth::DeviceInfo;

pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Bearer token from `Authorization`, if the header uses the Bearer scheme.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Raw refresh token from the `refresh_token` cookie.
pub fn refresh_token_cookie(headers: &HeaderMap) -> Option<String> {
    let prefix = format!("{REFRESH_COOKIE_NAME}=");
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|cookie| cookie.trim().strip_prefix(prefix.as_str()).map(str::to_string))
        .filter(|v| !v.is_empty())
}

pub fn refresh_cookie(raw: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>, secure: bool) -> String {
    let max_age = (expires_at - now).num_seconds().max(0);
    format!(
        "{REFRESH_COOKIE_NAME}={raw}; Path=/; HttpOnly; SameSite=Strict; Max-Age={max_age}{}",
        secure_attr(secure)
    )
}

pub fn clear_refresh_cookie(secure: bool) -> String {
    format!(
        "{REFRESH_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0{}",
        secure_attr(secure)
    )
}

fn secure_attr(secure: bool) -> &'static str {
    if secure { "; Secure" } else { "" }
}

/// First address of `X-Forwarded-For`, else `X-Real-IP`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn device_info(headers: &HeaderMap, device_name: Option<String>) -> DeviceInfo {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let device = DeviceInfo::new(user_agent, client_ip(headers));
    match device_name {
        Some(name) => device.with_device_name(name),
        None => device,
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use chrono::Duration;

    use super::*;

    #[test]
    fn finds_refresh_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; refresh_token=abc123; x=y"));
        assert_eq!(refresh_token_cookie(&headers), Some("abc123".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("other=value"));
        assert_eq!(refresh_token_cookie(&headers), None);
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer tok"));
        assert_eq!(bearer_token(&headers), Some("tok"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn cookie_attributes() {
        let now = Utc::now();
        let cookie = refresh_cookie("raw", now + Duration::days(30), now, true);
        assert_eq!(
            cookie,
            "refresh_token=raw; Path=/; HttpOnly; SameSite=Strict; Max-Age=2592000; Secure"
        );
        assert!(clear_refresh_cookie(false).ends_with("Max-Age=0"));
    }

    #[test]
    fn device_info_uses_forwarded_ip_and_user_agent() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.50, 70.41.3.18"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("okhttp/4.9"));

        let device = device_info(&headers, None);
        assert_eq!(device.ip_address.as_deref(), Some("203.0.113.50"));
        assert_eq!(device.resolved_name(), "Mobile App - Android");

        let named = device_info(&headers, Some("Work laptop".into()));
        assert_eq!(named.resolved_name(), "Work laptop");
    }
}
