use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Router,
};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

use crate::session::{
    postgres, spawn_cleanup_worker, CleanupWorkerConfig, PgCredentialStore, PgPrincipalDirectory,
    SessionConfig, SessionManager,
};

pub mod error;
pub mod gate;
pub(crate) mod handlers;
// OpenAPI document wiring lives in openapi.rs.
mod openapi;

pub use handlers::auth::{AuthConfig, AuthState};
pub use openapi::openapi;

use gate::AllowedRoles;
use handlers::{auth, health};

const REQUEST_ID: &str = "x-request-id";

/// Build the application router.
///
/// `pool` is only used by `/health`; the session state carries its own
/// storage handles.
#[must_use]
pub fn router(auth_state: Arc<AuthState>, pool: Option<sqlx::PgPool>) -> Router {
    let authenticated = Router::new()
        .route("/v1/auth/logout-all", post(auth::logout::logout_all))
        .route("/v1/auth/me", get(auth::me::me));

    let admin = Router::new()
        .route("/v1/admin/sessions/sweep", post(auth::admin::sweep))
        .route_layer(from_fn_with_state(AllowedRoles::ADMIN, gate::authorize));

    let protected = authenticated
        .merge(admin)
        .route_layer(from_fn_with_state(auth_state.clone(), gate::authenticate));

    let mut app = Router::new()
        .route("/health", get(health::health))
        .route("/v1/auth/register", post(auth::register::register))
        .route("/v1/auth/login", post(auth::login::login))
        .route("/v1/auth/refresh", post(auth::refresh::refresh))
        .route("/v1/auth/logout", post(auth::logout::logout))
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(Extension(auth_state));

    if let Some(pool) = pool {
        app = app.layer(Extension(pool));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static(REQUEST_ID),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                REQUEST_ID,
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span)),
    )
}

/// Start the server
/// # Errors
/// Return error if the database is unreachable, the schema cannot be applied,
/// or the listener fails
pub async fn new(
    port: u16,
    dsn: String,
    signing_key: SecretString,
    session_config: SessionConfig,
    auth_config: AuthConfig,
    cleanup_config: CleanupWorkerConfig,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    postgres::apply_schema(&pool).await?;

    let manager = Arc::new(SessionManager::new(
        signing_key,
        session_config,
        Arc::new(PgCredentialStore::new(pool.clone())),
        Arc::new(PgPrincipalDirectory::new(pool.clone())),
    )?);

    // Expired refresh rows are harmless; the sweep only keeps the table small.
    let cleanup = spawn_cleanup_worker(manager.clone(), cleanup_config);

    let auth_state = Arc::new(AuthState::new(manager, auth_config));
    let app = router(auth_state, Some(pool.clone()));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    cleanup.abort();
    pool.close().await;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
