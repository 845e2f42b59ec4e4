use std::time::Duration;

use super::duration::duration_or;

pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionConfig {
    /// Defaults: 15 minute access tokens, 7 day refresh credentials.
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
        }
    }

    /// Build from `15m`/`7d` style settings. Unusable values fall back to the
    /// defaults with a warning.
    #[must_use]
    pub fn from_settings(access_expires_in: &str, refresh_expires_in: &str) -> Self {
        Self {
            access_ttl: duration_or("jwt-access-expires-in", access_expires_in, DEFAULT_ACCESS_TTL),
            refresh_ttl: duration_or(
                "jwt-refresh-expires-in",
                refresh_expires_in,
                DEFAULT_REFRESH_TTL,
            ),
        }
    }

    #[must_use]
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}
