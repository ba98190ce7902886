//! The single entry point answering "is this request authenticated?".
//!
//! A bearer token passes two independent checks before the caller's
//! identity is resolved:
//!
//! 1. the codec verifies the signature and the token's own expiry without
//!    touching storage, so forged or stale tokens cost no round trip;
//! 2. the session store confirms the session is neither revoked nor past
//!    its server-side expiry, which is what makes logout immediate.
//!
//! Only a coarse failure kind escapes; handlers map every kind to the same
//! 401 so callers cannot distinguish a bad signature from a revoked
//! session.

use anyhow::Result;
use axum::http::{HeaderMap, StatusCode};
use sqlx::PgPool;
use tracing::error;

use super::session::extract_session_token;
use super::state::AuthState;
use super::storage::{lookup_session, UserRecord};
use super::utils::{hash_session_id, now_unix};

/// Coarse denial reasons; never exposed individually over HTTP.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum AuthFailure {
    /// No token was presented.
    Missing,
    /// The token failed signature, format, or self-expiry checks.
    Invalid,
    /// The token was intact but the session is gone, revoked, or expired.
    Expired,
}

pub(crate) enum AuthOutcome {
    Authenticated(UserRecord),
    Denied(AuthFailure),
}

/// Authenticate a raw bearer token.
///
/// Storage failures propagate as errors, distinct from denial: a flaky
/// database must never look like a revoked session.
pub(crate) async fn authenticate(
    pool: &PgPool,
    auth_state: &AuthState,
    raw_token: Option<&str>,
) -> Result<AuthOutcome> {
    let Some(token) = raw_token else {
        return Ok(AuthOutcome::Denied(AuthFailure::Missing));
    };

    let claims = match session_token::decode(auth_state.signing_key(), token, now_unix()) {
        Ok(claims) => claims,
        Err(_) => return Ok(AuthOutcome::Denied(AuthFailure::Invalid)),
    };

    let session_hash = hash_session_id(&claims.sid);
    match lookup_session(pool, &session_hash).await? {
        Some(user) => Ok(AuthOutcome::Authenticated(user)),
        None => Ok(AuthOutcome::Denied(AuthFailure::Expired)),
    }
}

/// Resolve the caller from request headers or reject with 401/500.
///
/// The helper every protected handler calls first.
pub(crate) async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    auth_state: &AuthState,
) -> Result<UserRecord, StatusCode> {
    let token = extract_session_token(headers);
    match authenticate(pool, auth_state, token.as_deref()).await {
        Ok(AuthOutcome::Authenticated(user)) => Ok(user),
        Ok(AuthOutcome::Denied(_)) => Err(StatusCode::UNAUTHORIZED),
        Err(err) => {
            error!("Failed to authenticate request: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::state::{AuthConfig, AuthState};
    use super::{authenticate, AuthFailure, AuthOutcome};
    use crate::api::notify::LogCodeSender;
    use anyhow::Result;
    use session_token::{SessionTokenClaims, SigningKey, TOKEN_VERSION};
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn auth_state() -> AuthState {
        AuthState::new(
            AuthConfig::new("http://localhost:3000".to_string()),
            SigningKey::from_bytes([7u8; 32]),
            Arc::new(LogCodeSender),
        )
    }

    #[tokio::test]
    async fn missing_token_is_denied_without_storage() -> Result<()> {
        // connect_lazy never dials, so a storage round trip would fail loudly.
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let outcome = authenticate(&pool, &auth_state(), None).await?;
        assert!(matches!(
            outcome,
            AuthOutcome::Denied(AuthFailure::Missing)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn garbage_token_is_denied_without_storage() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let outcome = authenticate(&pool, &auth_state(), Some("not-a-token")).await?;
        assert!(matches!(
            outcome,
            AuthOutcome::Denied(AuthFailure::Invalid)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn self_expired_token_is_denied_without_storage() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let state = auth_state();
        let claims = SessionTokenClaims {
            v: TOKEN_VERSION,
            sid: "sid".to_string(),
            iat: 0,
            exp: 1,
        };
        let token = session_token::encode(state.signing_key(), &claims)?;
        let outcome = authenticate(&pool, &state, Some(&token)).await?;
        assert!(matches!(
            outcome,
            AuthOutcome::Denied(AuthFailure::Invalid)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_key_token_is_denied_without_storage() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let claims = SessionTokenClaims {
            v: TOKEN_VERSION,
            sid: "sid".to_string(),
            iat: 0,
            exp: i64::MAX,
        };
        let token = session_token::encode(&SigningKey::from_bytes([8u8; 32]), &claims)?;
        let outcome = authenticate(&pool, &auth_state(), Some(&token)).await?;
        assert!(matches!(
            outcome,
            AuthOutcome::Denied(AuthFailure::Invalid)
        ));
        Ok(())
    }
}
