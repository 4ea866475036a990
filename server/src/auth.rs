//! Cookie and bearer authentication helpers.

use axum::http::HeaderMap;
use axum::http::header;

use session::AuthSession;

use crate::error::ApiError;
use crate::routes::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Pull the session token out of the Cookie header.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

/// Resolve the caller's session or fail 401.
pub async fn require_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthSession, ApiError> {
    let token = session_token(headers).ok_or_else(ApiError::unauthorized)?;
    state
        .sessions
        .resolve(&token, chrono::Utc::now())
        .await
        .ok_or_else(ApiError::unauthorized)
}

/// Resolve the caller's session and require the admin role.
pub async fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthSession, ApiError> {
    let session = require_session(state, headers).await?;
    if !session.is_admin() {
        return Err(ApiError::forbidden());
    }
    Ok(session)
}

/// Validate the monitor's bearer token. Ingest is disabled when no token
/// is configured.
pub fn require_monitor(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = state
        .monitor_token
        .as_deref()
        .ok_or_else(ApiError::unauthorized)?;

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(ApiError::unauthorized)?;

    if presented != expected {
        return Err(ApiError::unauthorized());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_parses_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc123; lang=en"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_cookie_yields_none() {
        let headers = HeaderMap::new();
        assert!(session_token(&headers).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark"));
        assert!(session_token(&headers).is_none());
    }
}
