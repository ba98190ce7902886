//! Auth handlers and supporting modules.
//!
//! This module coordinates email one-time-code login, opaque session
//! establishment, and the authentication gateway protected handlers call.
//!
//! ## Login Codes
//!
//! A login code is a short numeric secret delivered to a registered email.
//! Codes are stored as salted SHA-256 digests, expire after a short TTL,
//! allow a bounded number of guesses, and are superseded whenever a new
//! code is issued for the same email.
//!
//! ## Sessions
//!
//! Verifying a code mints an opaque session id, stored server-side only as
//! a hash, wrapped in an HMAC-signed bearer token that the dashboard sends
//! back as a cookie or `Authorization` header. Revoking the session (logout)
//! invalidates the token immediately, regardless of its embedded expiry.

pub(crate) mod gateway;
pub(crate) mod login;
pub(crate) mod session;
mod state;
mod storage;
pub(crate) mod types;
mod utils;

pub use state::{AuthConfig, AuthState};
