//! Database helpers for login codes and sessions.
//!
//! Login codes live in `login_codes`, one row per email: issuing a new code
//! overwrites the previous one (supersession), so storage stays bounded and
//! only the newest code can verify. Sessions live in `sessions`, keyed by
//! the SHA-256 of the opaque session id; raw ids never touch the database.

use anyhow::{anyhow, Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::{
    digests_match, generate_session_id, hash_login_code, hash_session_id, is_unique_violation,
};

/// Minimal identity data the core hands back to callers.
#[derive(Debug, Clone)]
pub(crate) struct UserRecord {
    pub(crate) user_id: Uuid,
    pub(crate) email: String,
    pub(crate) display_name: Option<String>,
}

/// A live (unconsumed, unexpired) login code row.
pub(super) struct LoginCodeRecord {
    pub(super) code_salt: Vec<u8>,
    pub(super) code_hash: Vec<u8>,
    pub(super) attempts: i32,
}

/// Decision for a candidate code against a live record.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum CodeCheck {
    Match,
    Mismatch,
    AttemptsExhausted,
}

/// Compare a candidate against the stored salted digest.
///
/// The attempt bound is checked first: once exhausted, even the correct
/// code is rejected. Digest comparison is constant-time.
pub(super) fn check_login_code(
    record: &LoginCodeRecord,
    candidate: &str,
    max_attempts: i32,
) -> CodeCheck {
    if record.attempts >= max_attempts {
        return CodeCheck::AttemptsExhausted;
    }
    let expected = hash_login_code(&record.code_salt, candidate);
    if digests_match(&expected, &record.code_hash) {
        CodeCheck::Match
    } else {
        CodeCheck::Mismatch
    }
}

/// Look up a registered user by normalized email.
pub(super) async fn lookup_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = "SELECT id, email, display_name FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user")?;

    Ok(row.map(|row| UserRecord {
        user_id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
    }))
}

/// Persist a freshly issued code, superseding any previous one for the email.
///
/// The UPSERT resets attempts and the consumed marker, so only the newest
/// code is ever live and the table holds at most one row per email.
pub(super) async fn upsert_login_code(
    pool: &PgPool,
    email: &str,
    code_salt: &[u8],
    code_hash: &[u8],
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO login_codes (email, code_salt, code_hash, issued_at, expires_at, attempts)
        VALUES ($1, $2, $3, NOW(), NOW() + ($4 * INTERVAL '1 second'), 0)
        ON CONFLICT (email) DO UPDATE
        SET code_salt = EXCLUDED.code_salt,
            code_hash = EXCLUDED.code_hash,
            issued_at = EXCLUDED.issued_at,
            expires_at = EXCLUDED.expires_at,
            attempts = 0,
            consumed_at = NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(code_salt)
        .bind(code_hash)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to upsert login code")?;
    Ok(())
}

/// Load the live login code row for an email, if any.
///
/// Expired or consumed rows are filtered here so every caller fails closed.
pub(super) async fn load_live_login_code(
    pool: &PgPool,
    email: &str,
) -> Result<Option<LoginCodeRecord>> {
    let query = r"
        SELECT code_salt, code_hash, attempts
        FROM login_codes
        WHERE email = $1
          AND consumed_at IS NULL
          AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load login code")?;

    Ok(row.map(|row| LoginCodeRecord {
        code_salt: row.get("code_salt"),
        code_hash: row.get("code_hash"),
        attempts: row.get("attempts"),
    }))
}

/// Record a failed guess against the live code.
pub(super) async fn bump_login_code_attempts(pool: &PgPool, email: &str) -> Result<()> {
    let query = r"
        UPDATE login_codes
        SET attempts = attempts + 1
        WHERE email = $1
          AND consumed_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to bump login code attempts")?;
    Ok(())
}

/// Atomically consume the live code for an email.
///
/// The `consumed_at IS NULL` guard is the single point of truth under
/// concurrent verifies: exactly one caller gets `true`, the rest see the
/// row already consumed. The digest guard pins the consume to the code
/// that was actually checked, so a supersession racing in between the
/// load and the consume makes the stale caller lose.
pub(super) async fn consume_login_code(
    pool: &PgPool,
    email: &str,
    code_hash: &[u8],
) -> Result<bool> {
    let query = r"
        UPDATE login_codes
        SET consumed_at = NOW()
        WHERE email = $1
          AND code_hash = $2
          AND consumed_at IS NULL
          AND expires_at > NOW()
        RETURNING email
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(code_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume login code")?;

    Ok(row.is_some())
}

/// Create a session row and return the raw opaque session id.
///
/// Only the hash is stored; the raw id goes into the signed bearer token.
pub(super) async fn insert_session(pool: &PgPool, user_id: Uuid, ttl_seconds: i64) -> Result<String> {
    let query = r"
        INSERT INTO sessions (session_hash, user_id, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let session_id = generate_session_id()?;
        let session_hash = hash_session_id(&session_id);
        let result = sqlx::query(query)
            .bind(session_hash)
            .bind(user_id)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(session_id),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session id"))
}

/// Resolve a session hash to its owner.
///
/// Revoked or expired sessions return `None` regardless of what the bearer
/// token claims; this check is authoritative.
pub(crate) async fn lookup_session(
    pool: &PgPool,
    session_hash: &[u8],
) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT users.id, users.email, users.display_name
        FROM sessions
        JOIN users ON users.id = sessions.user_id
        WHERE sessions.session_hash = $1
          AND sessions.revoked_at IS NULL
          AND sessions.expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(session_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    Ok(row.map(|row| UserRecord {
        user_id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
    }))
}

/// Revoke a session; idempotent, unknown ids are not an error.
///
/// Concurrent revokes converge: the `revoked_at IS NULL` guard makes the
/// second caller a no-op, and the original revocation time is kept.
pub(crate) async fn revoke_session(pool: &PgPool, session_hash: &[u8]) -> Result<()> {
    let query = r"
        UPDATE sessions
        SET revoked_at = NOW()
        WHERE session_hash = $1
          AND revoked_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke session")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::utils::hash_login_code;
    use super::{check_login_code, CodeCheck, LoginCodeRecord, UserRecord};
    use uuid::Uuid;

    fn record_for(code: &str, attempts: i32) -> LoginCodeRecord {
        let salt = [9u8; 16];
        LoginCodeRecord {
            code_salt: salt.to_vec(),
            code_hash: hash_login_code(&salt, code),
            attempts,
        }
    }

    #[test]
    fn correct_code_matches() {
        let record = record_for("482913", 0);
        assert_eq!(check_login_code(&record, "482913", 5), CodeCheck::Match);
    }

    #[test]
    fn wrong_code_mismatches() {
        let record = record_for("482913", 0);
        assert_eq!(check_login_code(&record, "000000", 5), CodeCheck::Mismatch);
    }

    #[test]
    fn correct_code_rejected_after_attempt_bound() {
        // Five wrong guesses lock the code even for the rightful holder.
        let record = record_for("482913", 5);
        assert_eq!(
            check_login_code(&record, "482913", 5),
            CodeCheck::AttemptsExhausted
        );
    }

    #[test]
    fn attempt_bound_is_exclusive_below() {
        let record = record_for("482913", 4);
        assert_eq!(check_login_code(&record, "482913", 5), CodeCheck::Match);
    }

    #[test]
    fn user_record_holds_values() {
        let record = UserRecord {
            user_id: Uuid::nil(),
            email: "alice@example.com".to_string(),
            display_name: Some("Alice".to_string()),
        };
        assert_eq!(record.user_id, Uuid::nil());
        assert_eq!(record.email, "alice@example.com");
        assert_eq!(record.display_name.as_deref(), Some("Alice"));
    }
}
