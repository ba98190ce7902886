//! Login code delivery abstraction.
//!
//! The service never speaks SMTP itself: a `CodeSender` receives the
//! plaintext code exactly once, right after issuing, and decides how to
//! deliver it (email API, SMTP relay, etc.). Delivery happens inline during
//! the login request so a failure can be reported to the caller instead of
//! being retried behind their back; the issued code is simply superseded by
//! the next login attempt.
//!
//! The default sender for local dev is `LogCodeSender`, which logs the code
//! and returns `Ok(())`.

use anyhow::Result;
use tracing::info;

/// Delivery abstraction for one-time login codes.
pub trait CodeSender: Send + Sync {
    /// Deliver a code or return an error so the caller can report
    /// the delivery failure.
    fn send(&self, email: &str, code: &str) -> Result<()>;
}

/// Local dev sender that logs the code instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogCodeSender;

impl CodeSender for LogCodeSender {
    fn send(&self, email: &str, code: &str) -> Result<()> {
        info!(to_email = %email, code = %code, "login code send stub");
        Ok(())
    }
}
