//! Small helpers for login code and session id handling.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Generate a zero-padded numeric login code.
///
/// Stored and compared as a string so leading zeros survive; the plaintext
/// is only ever handed to the sender.
pub(super) fn generate_login_code(digits: u32) -> Result<String> {
    let mut bytes = [0u8; 8];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate login code")?;
    // Modulo bias is negligible with 64 random bits over at most 10^9 values.
    let modulus = 10u64.pow(digits);
    let code = u64::from_be_bytes(bytes) % modulus;
    Ok(format!("{code:0width$}", width = digits as usize))
}

/// Per-code random salt so equal codes never share a digest.
pub(super) fn generate_code_salt() -> Result<[u8; 16]> {
    let mut salt = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut salt)
        .context("failed to generate code salt")?;
    Ok(salt)
}

/// Create a new opaque session id.
///
/// The raw value is only returned to mint the bearer token; the database
/// stores a hash.
pub(crate) fn generate_session_id() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session id")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a login code with its salt; plaintext codes never touch the database.
pub(super) fn hash_login_code(salt: &[u8], code: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(code.as_bytes());
    hasher.finalize().to_vec()
}

/// Hash a session id so raw values never touch the database.
/// The hash is used for lookups when the bearer token is presented.
pub(crate) fn hash_session_id(session_id: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.finalize().to_vec()
}

/// Constant-time digest comparison; length mismatch compares unequal.
pub(super) fn digests_match(expected: &[u8], stored: &[u8]) -> bool {
    expected.ct_eq(stored).into()
}

/// Seconds since the Unix epoch, for token claims.
pub(crate) fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(0))
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn generate_login_code_is_fixed_width_numeric() {
        for _ in 0..32 {
            let code = generate_login_code(6).expect("code generation");
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn generate_login_code_respects_digit_count() {
        let code = generate_login_code(8).expect("code generation");
        assert_eq!(code.len(), 8);
    }

    #[test]
    fn hash_login_code_depends_on_salt_and_code() {
        let salt_a = [1u8; 16];
        let salt_b = [2u8; 16];
        assert_eq!(
            hash_login_code(&salt_a, "482913"),
            hash_login_code(&salt_a, "482913")
        );
        assert_ne!(
            hash_login_code(&salt_a, "482913"),
            hash_login_code(&salt_b, "482913")
        );
        assert_ne!(
            hash_login_code(&salt_a, "482913"),
            hash_login_code(&salt_a, "000000")
        );
    }

    #[test]
    fn superseded_code_no_longer_matches_stored_digest() {
        // Issuing a new code overwrites salt+digest, so the old plaintext
        // fails the comparison even though it was valid moments before.
        let old_salt = [3u8; 16];
        let stored_old = hash_login_code(&old_salt, "111111");
        let new_salt = [4u8; 16];
        let stored_new = hash_login_code(&new_salt, "222222");

        assert!(digests_match(
            &hash_login_code(&old_salt, "111111"),
            &stored_old
        ));
        assert!(!digests_match(
            &hash_login_code(&new_salt, "111111"),
            &stored_new
        ));
    }

    #[test]
    fn digests_match_handles_length_mismatch() {
        assert!(!digests_match(&[1, 2, 3], &[1, 2]));
        assert!(digests_match(&[1, 2, 3], &[1, 2, 3]));
    }

    #[test]
    fn generate_session_id_round_trip() {
        let decoded_len = generate_session_id()
            .ok()
            .and_then(|id| Base64UrlUnpadded::decode_vec(&id).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn hash_session_id_stable() {
        let first = hash_session_id("session");
        let second = hash_session_id("session");
        let different = hash_session_id("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
    }

    #[test]
    fn now_unix_is_positive() {
        assert!(now_unix() > 0);
    }
}
