//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the server action with its full
//! configuration, including the session signing key held as a secret.

use crate::cli::actions::{server::Args, Action};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let signing_key = matches
        .get_one::<String>("signing-key")
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --signing-key")?;
    let dashboard_url = matches
        .get_one::<String>("dashboard-url")
        .cloned()
        .unwrap_or_else(|| "http://localhost:3000".to_string());

    Ok(Action::Server(Args {
        port,
        dsn,
        signing_key,
        dashboard_url,
        otp_ttl_seconds: matches
            .get_one::<i64>("otp-ttl-seconds")
            .copied()
            .unwrap_or(600),
        otp_max_attempts: matches
            .get_one::<i32>("otp-max-attempts")
            .copied()
            .unwrap_or(5),
        session_ttl_seconds: matches
            .get_one::<i64>("session-ttl-seconds")
            .copied()
            .unwrap_or(604_800),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::actions::Action;
    use secrecy::ExposeSecret;

    #[test]
    fn maps_matches_to_server_action() {
        temp_env::with_vars([("RECIBO_LOG_LEVEL", None::<&str>)], || {
            let command = crate::cli::commands::new();
            let matches = command.get_matches_from(vec![
                "recibo",
                "--dsn",
                "postgres://user@localhost:5432/recibo",
                "--signing-key",
                "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
                "--session-ttl-seconds",
                "3600",
            ]);

            let action = handler(&matches).expect("handler should map matches");
            let Action::Server(args) = action;
            assert_eq!(args.port, 8080);
            assert_eq!(args.dsn, "postgres://user@localhost:5432/recibo");
            assert_eq!(
                args.signing_key.expose_secret(),
                "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
            );
            assert_eq!(args.dashboard_url, "http://localhost:3000");
            assert_eq!(args.otp_ttl_seconds, 600);
            assert_eq!(args.otp_max_attempts, 5);
            assert_eq!(args.session_ttl_seconds, 3600);
        });
    }
}
