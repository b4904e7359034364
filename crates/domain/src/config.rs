//! Runtime configuration, read from the environment.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(String),

    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// Scheduler and delivery settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Local hour at which birthday messages become due.
    pub schedule_hour: u32,
    /// Per-job concurrent deliveries.
    pub worker_concurrency: usize,
    /// How often the dispatch pass runs.
    pub dispatch_interval: Duration,
    /// How often the reconciliation pass runs.
    pub reconcile_interval: Duration,
    /// Webhook endpoint for outbound messages.
    pub webhook_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schedule_hour: 9,
            worker_concurrency: 2,
            dispatch_interval: Duration::from_secs(30 * 60),
            reconcile_interval: Duration::from_secs(24 * 60 * 60),
            webhook_url: None,
        }
    }
}

impl AppConfig {
    /// Load from the environment, falling back to defaults per field.
    ///
    /// `JOB_SCHEDULE_TIME` is the due hour (0-23), `WORKER_CONCURRENCY` the
    /// per-job delivery parallelism, `REQUEST_BIN_API_URL` the webhook
    /// endpoint.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("JOB_SCHEDULE_TIME") {
            let hour: u32 = raw
                .parse()
                .map_err(|_| ConfigError::Invalid("JOB_SCHEDULE_TIME".into(), raw.clone()))?;
            if hour > 23 {
                return Err(ConfigError::Invalid("JOB_SCHEDULE_TIME".into(), raw));
            }
            config.schedule_hour = hour;
        }

        if let Ok(raw) = std::env::var("WORKER_CONCURRENCY") {
            let workers: usize = raw
                .parse()
                .map_err(|_| ConfigError::Invalid("WORKER_CONCURRENCY".into(), raw.clone()))?;
            if workers == 0 {
                return Err(ConfigError::Invalid("WORKER_CONCURRENCY".into(), raw));
            }
            config.worker_concurrency = workers;
        }

        if let Ok(url) = std::env::var("REQUEST_BIN_API_URL") {
            config.webhook_url = Some(url);
        }

        Ok(config)
    }

    pub fn with_schedule_hour(mut self, hour: u32) -> Self {
        self.schedule_hour = hour;
        self
    }

    pub fn with_worker_concurrency(mut self, workers: usize) -> Self {
        self.worker_concurrency = workers;
        self
    }

    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }
}
