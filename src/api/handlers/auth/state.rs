use std::sync::Arc;

use crate::session::SessionManager;

const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:5173";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self { frontend_base_url }
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    #[must_use]
    pub fn refresh_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FRONTEND_BASE_URL.to_string())
    }
}

/// Shared state for the auth handlers and the request gate.
#[derive(Debug)]
pub struct AuthState {
    manager: Arc<SessionManager>,
    config: AuthConfig,
}

impl AuthState {
    #[must_use]
    pub fn new(manager: Arc<SessionManager>, config: AuthConfig) -> Self {
        Self { manager, config }
    }

    #[must_use]
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}
