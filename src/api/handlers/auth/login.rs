//! Email one-time-code login endpoints.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use session_token::{SessionTokenClaims, TOKEN_VERSION};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::session::session_cookie;
use super::state::AuthState;
use super::storage::{
    bump_login_code_attempts, check_login_code, consume_login_code, insert_session,
    load_live_login_code, lookup_user_by_email, upsert_login_code, CodeCheck,
};
use super::types::{LoginRequest, VerifyRequest, VerifyResponse};
use super::utils::{
    generate_code_salt, generate_login_code, hash_login_code, normalize_email, now_unix,
    valid_email,
};

// One message for every verification failure so callers cannot probe which
// check rejected them.
const INVALID_CODE_MESSAGE: &str = "Invalid or expired code";

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 204, description = "Login code issued and handed to delivery"),
        (status = 400, description = "Validation error", body = String),
        (status = 404, description = "No account for that email", body = String),
        (status = 502, description = "Code delivery failed", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email_normalized = normalize_email(&request.email);
    if !valid_email(&email_normalized) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    let user = match lookup_user_by_email(&pool, &email_normalized).await {
        Ok(Some(user)) => user,
        // Signups happen elsewhere; an unknown email is stated plainly
        // instead of pretending a code was sent.
        Ok(None) => {
            return (StatusCode::NOT_FOUND, "No such account".to_string()).into_response();
        }
        Err(err) => {
            error!("Login code lookup failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response();
        }
    };

    let config = auth_state.config();
    let (code, salt) = match generate_login_code(config.otp_code_digits())
        .and_then(|code| generate_code_salt().map(|salt| (code, salt)))
    {
        Ok(pair) => pair,
        Err(err) => {
            error!("Login code generation failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response();
        }
    };
    let code_hash = hash_login_code(&salt, &code);

    // Persist before sending: a code the user receives must be verifiable.
    if let Err(err) = upsert_login_code(
        &pool,
        &user.email,
        &salt,
        &code_hash,
        config.otp_ttl_seconds(),
    )
    .await
    {
        error!("Login code upsert failed: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Login failed".to_string(),
        )
            .into_response();
    }

    if let Err(err) = auth_state.sender().send(&user.email, &code) {
        error!("Login code delivery failed: {err}");
        // The stored code stays live but undeliverable; the next login
        // attempt supersedes it.
        return (StatusCode::BAD_GATEWAY, "Delivery failed".to_string()).into_response();
    }

    StatusCode::NO_CONTENT.into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Code accepted, session established", body = VerifyResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid or expired code", body = String)
    ),
    tag = "auth"
)]
pub async fn verify(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyRequest>>,
) -> impl IntoResponse {
    let request: VerifyRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email_normalized = normalize_email(&request.email);
    if !valid_email(&email_normalized) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    let candidate = request.code.trim();
    if candidate.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing code".to_string()).into_response();
    }

    match establish_session(&pool, &auth_state, &email_normalized, candidate).await {
        Ok((response, cookie)) => {
            let mut headers = HeaderMap::new();
            headers.insert(SET_COOKIE, cookie);
            (StatusCode::OK, headers, Json(response)).into_response()
        }
        Err((status, message)) => (status, message).into_response(),
    }
}

async fn establish_session(
    pool: &PgPool,
    auth_state: &AuthState,
    email_normalized: &str,
    candidate: &str,
) -> Result<(VerifyResponse, axum::http::HeaderValue), (StatusCode, String)> {
    let config = auth_state.config();

    let record = match load_live_login_code(pool, email_normalized).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return Err((StatusCode::UNAUTHORIZED, INVALID_CODE_MESSAGE.to_string()));
        }
        Err(err) => {
            error!("Login code load failed: {err}");
            return Err(verify_failure());
        }
    };

    match check_login_code(&record, candidate, config.otp_max_attempts()) {
        CodeCheck::Match => {}
        CodeCheck::AttemptsExhausted => {
            return Err((StatusCode::UNAUTHORIZED, INVALID_CODE_MESSAGE.to_string()));
        }
        CodeCheck::Mismatch => {
            if let Err(err) = bump_login_code_attempts(pool, email_normalized).await {
                error!("Login code attempt bump failed: {err}");
            }
            return Err((StatusCode::UNAUTHORIZED, INVALID_CODE_MESSAGE.to_string()));
        }
    }

    // The consume is the atomic gate: a concurrent verify that lost the
    // race sees the row already consumed, and a code superseded since the
    // load no longer matches the digest guard.
    match consume_login_code(pool, email_normalized, &record.code_hash).await {
        Ok(true) => {}
        Ok(false) => {
            return Err((StatusCode::UNAUTHORIZED, INVALID_CODE_MESSAGE.to_string()));
        }
        Err(err) => {
            error!("Login code consume failed: {err}");
            return Err(verify_failure());
        }
    }

    let user = match lookup_user_by_email(pool, email_normalized).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            // The account vanished between issue and verify.
            return Err((StatusCode::UNAUTHORIZED, INVALID_CODE_MESSAGE.to_string()));
        }
        Err(err) => {
            error!("User lookup failed: {err}");
            return Err(verify_failure());
        }
    };

    let session_id = match insert_session(pool, user.user_id, config.session_ttl_seconds()).await {
        Ok(session_id) => session_id,
        Err(err) => {
            error!("Session insert failed: {err}");
            return Err(verify_failure());
        }
    };

    let issued_at = now_unix();
    let claims = SessionTokenClaims {
        v: TOKEN_VERSION,
        sid: session_id,
        iat: issued_at,
        exp: issued_at + config.session_ttl_seconds(),
    };
    let token = match session_token::encode(auth_state.signing_key(), &claims) {
        Ok(token) => token,
        Err(err) => {
            error!("Session token encoding failed: {err}");
            return Err(verify_failure());
        }
    };

    let cookie = match session_cookie(config, &token) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Session cookie build failed: {err}");
            return Err(verify_failure());
        }
    };

    Ok((
        VerifyResponse {
            token,
            user_id: user.user_id.to_string(),
            email: user.email,
        },
        cookie,
    ))
}

fn verify_failure() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Verification failed".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::super::state::{AuthConfig, AuthState};
    use super::{login, verify};
    use crate::api::notify::LogCodeSender;
    use anyhow::Result;
    use axum::extract::Extension;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::Json;
    use session_token::SigningKey;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn auth_state() -> Arc<AuthState> {
        Arc::new(AuthState::new(
            AuthConfig::new("http://localhost:3000".to_string()),
            SigningKey::from_bytes([7u8; 32]),
            Arc::new(LogCodeSender),
        ))
    }

    #[tokio::test]
    async fn login_rejects_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = login(Extension(pool), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn login_rejects_invalid_email() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let payload = Json(super::LoginRequest {
            email: "not-an-email".to_string(),
        });
        let response = login(Extension(pool), Extension(auth_state()), Some(payload))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_rejects_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = verify(Extension(pool), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_rejects_empty_code() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let payload = Json(super::VerifyRequest {
            email: "alice@example.com".to_string(),
            code: "   ".to_string(),
        });
        let response = verify(Extension(pool), Extension(auth_state()), Some(payload))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
