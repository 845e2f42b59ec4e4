use crate::{
    api::{self, AuthConfig},
    cli::telemetry,
    session::{CleanupWorkerConfig, SessionConfig},
    APP_USER_AGENT,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use tracing::{debug, info};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub signing_key: SecretString,
    pub access_expires_in: String,
    pub refresh_expires_in: String,
    pub cleanup_interval_seconds: u64,
    pub frontend_base_url: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the DSN or frontend URL is malformed, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let dsn = Url::parse(&args.dsn).context("invalid database connection string")?;
    let frontend = Url::parse(&args.frontend_base_url).context("invalid frontend base URL")?;

    info!("starting {APP_USER_AGENT}");
    debug!(
        port = args.port,
        database = %redacted(&dsn),
        frontend = %frontend,
        access_expires_in = %args.access_expires_in,
        refresh_expires_in = %args.refresh_expires_in,
        cleanup_interval_seconds = args.cleanup_interval_seconds,
        "server arguments"
    );

    let session_config =
        SessionConfig::from_settings(&args.access_expires_in, &args.refresh_expires_in);
    let auth_config = AuthConfig::new(args.frontend_base_url);
    let cleanup_config =
        CleanupWorkerConfig::new().with_interval_seconds(args.cleanup_interval_seconds);

    let result = api::new(
        args.port,
        dsn.to_string(),
        args.signing_key,
        session_config,
        auth_config,
        cleanup_config,
    )
    .await;

    telemetry::shutdown_tracer();

    result
}

fn redacted(dsn: &Url) -> Url {
    let mut dsn = dsn.clone();
    if dsn.password().is_some() {
        let _ = dsn.set_password(Some("****"));
    }
    dsn
}
