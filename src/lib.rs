//! # Recibo authentication service
//!
//! `recibo` is the authentication backend for the receipts dashboard. A
//! registered user signs in by requesting a one-time password (OTP) delivered
//! to their email address; verifying the code mints a server-side session and
//! a signed bearer token carried by the dashboard as a cookie.
//!
//! ## Core pieces
//!
//! - **OTP store** — one live code per email (issuing supersedes the previous
//!   code), stored as a salted hash, single-use, attempt-bounded.
//! - **Session store** — opaque high-entropy session ids, stored hashed, with
//!   server-side expiry and idempotent revocation.
//! - **Session token codec** (`session_token` crate) — HMAC-signed envelope
//!   over the session id with its own embedded expiry, so forged or stale
//!   tokens are rejected before any storage round trip.
//! - **Auth gateway** — the single `authenticate` entry point protected
//!   handlers call; all denial reasons collapse to one coarse failure.
//!
//! Receipt queries, page rendering, and real email transport live elsewhere;
//! this service only answers "who is this request from?".

pub mod api;
pub mod cli;
