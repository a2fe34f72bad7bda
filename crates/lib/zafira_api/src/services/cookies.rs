//! Session cookie service.
//!
//! Both login paths go through [`session_cookie`], so the cookie attributes
//! are identical whichever way the session was opened.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;
use zafira_core::auth::jwt::SESSION_TOKEN_EXPIRY_SECS;

/// Cookie name for the session token.
pub const SESSION_COOKIE: &str = "auth_token";

fn base_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE.to_string(), value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .build()
}

/// Build the httpOnly session cookie (7 days).
pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(token, secure);
    cookie.set_max_age(Duration::seconds(SESSION_TOKEN_EXPIRY_SECS));
    cookie
}

/// Build an expired cookie with the same attributes to clear the session.
pub fn clear_session_cookie(secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(String::new(), secure);
    cookie.set_max_age(Duration::ZERO);
    cookie
}

/// Session token from the `auth_token` cookie, falling back to
/// `Authorization: Bearer`.
pub fn session_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE)
        && !cookie.value().is_empty()
    {
        return Some(cookie.value().to_string());
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum::http::header::COOKIE;

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie("tok".into(), true);
        assert_eq!(cookie.name(), "auth_token");
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::days(7)));
    }

    #[test]
    fn clear_cookie_matches_session_cookie() {
        let set = session_cookie("tok".into(), false);
        let clear = clear_session_cookie(false);
        assert_eq!(clear.name(), set.name());
        assert_eq!(clear.path(), set.path());
        assert_eq!(clear.secure(), set.secure());
        assert_eq!(clear.same_site(), set.same_site());
        assert_eq!(clear.max_age(), Some(Duration::ZERO));
        assert_eq!(clear.value(), "");
    }

    #[test]
    fn token_prefers_cookie_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; auth_token=from-cookie"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(session_token_from_headers(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn token_falls_back_to_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(session_token_from_headers(&headers).as_deref(), Some("from-header"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(session_token_from_headers(&headers), None);
    }
}
