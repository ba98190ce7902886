//! Auth state and configuration.

use crate::api::notify::CodeSender;
use session_token::SigningKey;
use std::sync::Arc;

const DEFAULT_OTP_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_OTP_MAX_ATTEMPTS: i32 = 5;
const DEFAULT_OTP_CODE_DIGITS: u32 = 6;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    dashboard_base_url: String,
    otp_ttl_seconds: i64,
    otp_max_attempts: i32,
    otp_code_digits: u32,
    session_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(dashboard_base_url: String) -> Self {
        Self {
            dashboard_base_url,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            otp_max_attempts: DEFAULT_OTP_MAX_ATTEMPTS,
            otp_code_digits: DEFAULT_OTP_CODE_DIGITS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_max_attempts(mut self, attempts: i32) -> Self {
        self.otp_max_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_otp_code_digits(mut self, digits: u32) -> Self {
        // Anything below 4 digits is guessable within the attempt bound.
        self.otp_code_digits = digits.clamp(4, 9);
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    pub(crate) fn dashboard_base_url(&self) -> &str {
        &self.dashboard_base_url
    }

    pub(super) fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    pub(super) fn otp_max_attempts(&self) -> i32 {
        self.otp_max_attempts
    }

    pub(super) fn otp_code_digits(&self) -> u32 {
        self.otp_code_digits
    }

    pub(super) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(super) fn session_cookie_secure(&self) -> bool {
        self.dashboard_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    signing_key: SigningKey,
    sender: Arc<dyn CodeSender>,
}

impl AuthState {
    pub fn new(config: AuthConfig, signing_key: SigningKey, sender: Arc<dyn CodeSender>) -> Self {
        Self {
            config,
            signing_key,
            sender,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub(super) fn sender(&self) -> &dyn CodeSender {
        self.sender.as_ref()
    }
}
