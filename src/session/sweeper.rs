use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{debug, error, info};

use super::manager::SessionManager;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug)]
pub struct CleanupWorkerConfig {
    interval: Duration,
}

impl CleanupWorkerConfig {
    /// Default: one sweep per hour.
    #[must_use]
    pub fn new() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
        }
    }

    #[must_use]
    pub fn with_interval_seconds(mut self, seconds: u64) -> Self {
        self.interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval.max(MIN_INTERVAL)
    }
}

impl Default for CleanupWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically delete expired refresh credentials until the task is aborted.
pub fn spawn_cleanup_worker(
    manager: Arc<SessionManager>,
    config: CleanupWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = config.interval();
        info!(interval_seconds = interval.as_secs(), "credential cleanup worker started");

        loop {
            match manager.sweep_expired().await {
                Ok(0) => debug!("no expired refresh credentials"),
                Ok(deleted) => info!(deleted, "expired refresh credentials deleted"),
                Err(err) => error!("credential cleanup failed: {err}"),
            }

            sleep(interval).await;
        }
    })
}
