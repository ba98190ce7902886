use crate::api::{self, notify::LogCodeSender, AuthConfig, AuthState};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use session_token::SigningKey;
use std::sync::Arc;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub signing_key: SecretString,
    pub dashboard_url: String,
    pub otp_ttl_seconds: i64,
    pub otp_max_attempts: i32,
    pub session_ttl_seconds: i64,
}

/// Execute the server action.
///
/// # Errors
///
/// Returns an error if the signing key is invalid or the server fails to
/// start.
pub async fn execute(args: Args) -> Result<()> {
    // The key must be stable process-wide configuration so tokens survive
    // restarts; it is never generated here.
    let signing_key = SigningKey::from_base64(args.signing_key.expose_secret())
        .context("Invalid --signing-key: expected base64 encoded 32 bytes")?;

    let auth_config = AuthConfig::new(args.dashboard_url)
        .with_otp_ttl_seconds(args.otp_ttl_seconds)
        .with_otp_max_attempts(args.otp_max_attempts)
        .with_session_ttl_seconds(args.session_ttl_seconds);

    let auth_state = Arc::new(AuthState::new(
        auth_config,
        signing_key,
        Arc::new(LogCodeSender),
    ));

    api::new(args.port, args.dsn, auth_state).await?;

    Ok(())
}
