//! Session endpoints for cookie and bearer auth.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::gateway::require_auth;
use super::state::{AuthConfig, AuthState};
use super::storage::revoke_session;
use super::types::SessionResponse;
use super::utils::{hash_session_id, now_unix};

const SESSION_COOKIE_NAME: &str = "recibo_session";

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 401, description = "Missing, invalid, or expired credential")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match require_auth(&headers, &pool, &auth_state).await {
        Ok(user) => {
            let response = SessionResponse {
                user_id: user.user_id.to_string(),
                email: user.email,
                display_name: user.display_name,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(status) => status.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared"),
        (status = 500, description = "Session revocation failed", body = String)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // Logout succeeds regardless of token validity; a token that fails to
    // decode references no session we could revoke anyway. A storage failure
    // is different: the session may still be live, so it must surface.
    if let Some(token) = extract_session_token(&headers) {
        if let Ok(claims) = session_token::decode(auth_state.signing_key(), &token, now_unix()) {
            let session_hash = hash_session_id(&claims.sid);
            if let Err(err) = revoke_session(&pool, &session_hash).await {
                error!("Failed to revoke session: {err}");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Logout failed".to_string(),
                )
                    .into_response();
            }
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Build a secure `HttpOnly` cookie for the bearer token.
pub(super) fn session_cookie(
    auth_config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = auth_config.session_ttl_seconds();
    // Only mark cookies secure when the dashboard is served over HTTPS.
    let secure = auth_config.session_cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(auth_config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = auth_config.session_cookie_secure();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Pull the bearer token from the Authorization header or session cookie.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::super::state::{AuthConfig, AuthState};
    use super::{clear_session_cookie, extract_session_token, logout, session, session_cookie};
    use crate::api::notify::LogCodeSender;
    use anyhow::{Context, Result};
    use axum::extract::Extension;
    use axum::http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode};
    use axum::response::IntoResponse;
    use session_token::SigningKey;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn auth_state() -> Arc<AuthState> {
        Arc::new(AuthState::new(
            AuthConfig::new("https://receipts.example.com".to_string()),
            SigningKey::from_bytes([7u8; 32]),
            Arc::new(LogCodeSender),
        ))
    }

    #[test]
    fn session_cookie_carries_security_attributes() -> Result<()> {
        let config = AuthConfig::new("https://receipts.example.com".to_string());
        let cookie = session_cookie(&config, "token")?;
        let value = cookie.to_str()?;
        assert!(value.starts_with("recibo_session=token"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Secure"));
        assert!(value.contains(&format!("Max-Age={}", 7 * 24 * 60 * 60)));
        Ok(())
    }

    #[test]
    fn session_cookie_not_secure_for_http_dashboard() -> Result<()> {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        let cookie = session_cookie(&config, "token")?;
        assert!(!cookie.to_str()?.contains("Secure"));
        Ok(())
    }

    #[test]
    fn clear_session_cookie_expires_immediately() -> Result<()> {
        let config = AuthConfig::new("https://receipts.example.com".to_string());
        let cookie = clear_session_cookie(&config)?;
        let value = cookie.to_str()?;
        assert!(value.starts_with("recibo_session=;"));
        assert!(value.contains("Max-Age=0"));
        Ok(())
    }

    #[test]
    fn extract_prefers_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        headers.insert("cookie", HeaderValue::from_static("recibo_session=def"));
        assert_eq!(extract_session_token(&headers), Some("abc".to_string()));
    }

    #[test]
    fn extract_falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("theme=dark; recibo_session=def"),
        );
        assert_eq!(extract_session_token(&headers), Some("def".to_string()));
    }

    #[test]
    fn extract_none_when_missing() {
        let headers = HeaderMap::new();
        assert_eq!(extract_session_token(&headers), None);
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(extract_session_token(&headers), None);
    }

    #[tokio::test]
    async fn session_without_credential_is_unauthorized() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = session(HeaderMap::new(), Extension(pool), Extension(auth_state()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn logout_surfaces_revoke_storage_failure() -> Result<()> {
        // A valid token reaches the revoke statement; the lazy pool then
        // fails the round trip, and that must not be reported as success.
        let state = auth_state();
        let claims = session_token::SessionTokenClaims {
            v: session_token::TOKEN_VERSION,
            sid: "sid".to_string(),
            iat: 0,
            exp: i64::MAX,
        };
        let token = session_token::encode(state.signing_key(), &claims)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}"))?,
        );

        // Port 1 is never a Postgres, so the UPDATE round trip always fails.
        let pool =
            PgPoolOptions::new().connect_lazy("postgres://postgres@localhost:1/postgres")?;
        let response = logout(headers, Extension(pool), Extension(state))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        Ok(())
    }

    #[tokio::test]
    async fn logout_without_credential_still_clears_cookie() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = logout(HeaderMap::new(), Extension(pool), Extension(auth_state()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .context("missing Set-Cookie")?;
        assert!(cookie.to_str()?.contains("Max-Age=0"));
        Ok(())
    }
}
