//! Maps validated CLI arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::session;
use anyhow::{Context, Result};

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

    let session_opts = session::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        signing_key: session_opts.signing_key,
        access_expires_in: session_opts.access_expires_in,
        refresh_expires_in: session_opts.refresh_expires_in,
        cleanup_interval_seconds: session_opts.cleanup_interval_seconds,
        frontend_base_url: session_opts.frontend_base_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn builds_server_action_from_env() -> Result<()> {
        temp_env::with_vars(
            [
                ("LARDER_PORT", Some("9090")),
                ("LARDER_DSN", Some("postgres://localhost:5432/larder")),
                ("LARDER_JWT_ACCESS_SECRET", Some("k3y")),
                ("LARDER_JWT_ACCESS_EXPIRES_IN", Some("10m")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["larder"]);
                let Action::Server(args) = handler(&matches)?;
                assert_eq!(args.port, 9090);
                assert_eq!(args.dsn, "postgres://localhost:5432/larder");
                assert_eq!(args.signing_key.expose_secret(), "k3y");
                assert_eq!(args.access_expires_in, "10m");
                Ok(())
            },
        )
    }
}
