use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
};

use crate::auth::sessions::SessionUser;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "sid";

/// Pull the session token out of the `sid` cookie, falling back to an
/// `Authorization: Bearer` header for API clients.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(cookies) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        for pair in cookies.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                if name == SESSION_COOKIE && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Resolves the authenticated user behind the request's session token.
/// Absent or expired session means not authenticated.
pub struct CurrentUser(pub SessionUser);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers)
            .ok_or((StatusCode::UNAUTHORIZED, "not logged in".to_string()))?;

        let user = state
            .sessions
            .get(&token)
            .await
            .ok_or((StatusCode::UNAUTHORIZED, "session expired".to_string()))?;

        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn token_from_session_cookie() {
        let headers = headers_with(header::COOKIE, "theme=dark; sid=abc123; lang=en");
        assert_eq!(session_token(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn token_from_bearer_header() {
        let headers = headers_with(header::AUTHORIZATION, "Bearer tok-456");
        assert_eq!(session_token(&headers), Some("tok-456".to_string()));
    }

    #[test]
    fn cookie_wins_over_bearer() {
        let mut headers = headers_with(header::COOKIE, "sid=cookie-token");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer bearer-token"),
        );
        assert_eq!(session_token(&headers), Some("cookie-token".to_string()));
    }

    #[test]
    fn empty_or_missing_token_is_none() {
        assert_eq!(session_token(&HeaderMap::new()), None);
        let headers = headers_with(header::COOKIE, "sid=");
        assert_eq!(session_token(&headers), None);
        let headers = headers_with(header::AUTHORIZATION, "Basic dXNlcg==");
        assert_eq!(session_token(&headers), None);
    }
}
