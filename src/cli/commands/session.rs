use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_ACCESS_SECRET: &str = "jwt-access-secret";
pub const ARG_JWT_ACCESS_EXPIRES_IN: &str = "jwt-access-expires-in";
pub const ARG_JWT_REFRESH_EXPIRES_IN: &str = "jwt-refresh-expires-in";
pub const ARG_CLEANUP_INTERVAL_SECONDS: &str = "cleanup-interval-seconds";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

/// Session settings taken from the command line or environment.
#[derive(Debug)]
pub struct Options {
    pub signing_key: SecretString,
    pub access_expires_in: String,
    pub refresh_expires_in: String,
    pub cleanup_interval_seconds: u64,
    pub frontend_base_url: String,
}

impl Options {
    /// # Errors
    /// Returns an error if the signing key is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let signing_key = matches
            .get_one::<String>(ARG_JWT_ACCESS_SECRET)
            .cloned()
            .context("missing required argument: --jwt-access-secret")?;

        Ok(Self {
            signing_key: SecretString::from(signing_key),
            access_expires_in: string_or_default(matches, ARG_JWT_ACCESS_EXPIRES_IN),
            refresh_expires_in: string_or_default(matches, ARG_JWT_REFRESH_EXPIRES_IN),
            cleanup_interval_seconds: matches
                .get_one::<u64>(ARG_CLEANUP_INTERVAL_SECONDS)
                .copied()
                .unwrap_or(3600),
            frontend_base_url: string_or_default(matches, ARG_FRONTEND_BASE_URL),
        })
    }
}

fn string_or_default(matches: &ArgMatches, id: &str) -> String {
    matches.get_one::<String>(id).cloned().unwrap_or_default()
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_ACCESS_SECRET)
                .long(ARG_JWT_ACCESS_SECRET)
                .help("Key used to sign and verify access tokens")
                .env("LARDER_JWT_ACCESS_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_JWT_ACCESS_EXPIRES_IN)
                .long(ARG_JWT_ACCESS_EXPIRES_IN)
                .help("Access token lifetime: <integer><s|m|h|d>, e.g. 900s, 15m, 1h")
                .env("LARDER_JWT_ACCESS_EXPIRES_IN")
                .default_value("15m"),
        )
        .arg(
            Arg::new(ARG_JWT_REFRESH_EXPIRES_IN)
                .long(ARG_JWT_REFRESH_EXPIRES_IN)
                .help("Refresh credential lifetime: <integer><s|m|h|d>, e.g. 12h, 7d")
                .env("LARDER_JWT_REFRESH_EXPIRES_IN")
                .default_value("7d"),
        )
        .arg(
            Arg::new(ARG_CLEANUP_INTERVAL_SECONDS)
                .long(ARG_CLEANUP_INTERVAL_SECONDS)
                .help("Seconds between sweeps of expired refresh credentials")
                .env("LARDER_CLEANUP_INTERVAL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend origin; an https URL marks the refresh cookie Secure")
                .env("LARDER_FRONTEND_BASE_URL")
                .default_value("http://localhost:5173"),
        )
}
