//! Signed session token envelope.
//!
//! A session token is a stateless bearer credential: a JSON payload
//! (`{v, sid, iat, exp}`) encoded as unpadded base64url, followed by an
//! HMAC-SHA256 signature over the encoded payload, joined with a dot.
//! The server keeps no copy of the token; only the signing key.
//!
//! Decoding checks the signature before reading any claims, so a tampered
//! payload is rejected without revealing which byte changed. The embedded
//! expiry bounds exposure even when the server-side revocation check is
//! unavailable; the session store remains authoritative for revocation.

use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

pub const TOKEN_VERSION: u8 = 1;

/// Signing keys are exactly 32 bytes, supplied as base64 configuration.
pub const KEY_LENGTH: usize = 32;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionTokenClaims {
    pub v: u8,
    /// Opaque session id minted by the session store.
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64 encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("signing key must be {KEY_LENGTH} bytes")]
    KeyLength,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid token version")]
    InvalidVersion,
}

/// Process-wide symmetric signing key.
///
/// Loaded once at startup from configuration; tokens stay valid across
/// process restarts as long as the same key is supplied.
#[derive(Clone)]
pub struct SigningKey([u8; KEY_LENGTH]);

impl SigningKey {
    /// Parse a base64 (standard alphabet) encoded 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Base64` for malformed input and `Error::KeyLength`
    /// when the decoded key is not exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        let bytes = Base64::decode_vec(encoded.trim()).map_err(|_| Error::Base64)?;
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| Error::KeyLength)?;
        Ok(Self(key))
    }

    #[must_use]
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self(key)
    }

    fn mac(&self) -> Result<HmacSha256, Error> {
        HmacSha256::new_from_slice(&self.0).map_err(|_| Error::KeyLength)
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("SigningKey(..)")
    }
}

/// Encode claims into a signed token string safe for cookie transport.
///
/// # Errors
///
/// Returns an error if the claims cannot be serialized or the key is
/// rejected by the MAC implementation.
pub fn encode(key: &SigningKey, claims: &SessionTokenClaims) -> Result<String, Error> {
    let payload = serde_json::to_vec(claims)?;
    let payload_b64 = Base64UrlUnpadded::encode_string(&payload);

    let mut mac = key.mac()?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

    Ok(format!("{payload_b64}.{signature_b64}"))
}

/// Verify a token and return its claims.
///
/// The signature is checked first, in constant time, before any claim is
/// parsed. The embedded expiry is compared against `now_unix_seconds`.
///
/// # Errors
///
/// Returns an error if:
/// - the token is malformed or contains invalid base64/json,
/// - the signature does not match,
/// - the version is unknown,
/// - the embedded expiry has passed.
pub fn decode(
    key: &SigningKey,
    token: &str,
    now_unix_seconds: i64,
) -> Result<SessionTokenClaims, Error> {
    let mut parts = token.split('.');
    let payload_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let signature_b64 = parts.next().ok_or(Error::TokenFormat)?;
    if parts.next().is_some() || payload_b64.is_empty() {
        return Err(Error::TokenFormat);
    }

    let signature = Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| Error::Base64)?;

    let mut mac = key.mac()?;
    mac.update(payload_b64.as_bytes());
    // verify_slice is constant-time.
    mac.verify_slice(&signature)
        .map_err(|_| Error::InvalidSignature)?;

    let payload = Base64UrlUnpadded::decode_vec(payload_b64).map_err(|_| Error::Base64)?;
    let claims: SessionTokenClaims = serde_json::from_slice(&payload)?;

    if claims.v != TOKEN_VERSION {
        return Err(Error::InvalidVersion);
    }
    if claims.exp <= now_unix_seconds {
        return Err(Error::Expired);
    }

    Ok(claims)
}
