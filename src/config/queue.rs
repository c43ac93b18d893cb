//! Job queue configuration

use std::time::Duration;

use serde::Deserialize;

use super::error::ValidationError;
use crate::adapters::queue::QueueConfig;

/// Job queue settings.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// Number of concurrent workers.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Delivery attempts before a job is parked as failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay in milliseconds; doubled per attempt.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Completed jobs retained for audit.
    #[serde(default = "default_keep_completed")]
    pub keep_completed: usize,

    /// Age bound on completed jobs, in seconds.
    #[serde(default = "default_completed_ttl_secs")]
    pub completed_ttl_secs: u64,

    /// Age bound on failed jobs, in seconds.
    #[serde(default = "default_failed_ttl_secs")]
    pub failed_ttl_secs: u64,
}

impl QueueSettings {
    /// Builds the queue adapter configuration.
    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            concurrency: self.concurrency,
            max_attempts: self.max_attempts,
            backoff_base: Duration::from_millis(self.backoff_ms),
            keep_completed: self.keep_completed,
            completed_ttl: Duration::from_secs(self.completed_ttl_secs),
            failed_ttl: Duration::from_secs(self.failed_ttl_secs),
        }
    }

    /// Validate queue settings
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.concurrency == 0 {
            return Err(ValidationError::InvalidConcurrency);
        }
        if self.max_attempts == 0 {
            return Err(ValidationError::InvalidMaxAttempts);
        }
        Ok(())
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            keep_completed: default_keep_completed(),
            completed_ttl_secs: default_completed_ttl_secs(),
            failed_ttl_secs: default_failed_ttl_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_keep_completed() -> usize {
    100
}

fn default_completed_ttl_secs() -> u64 {
    3600
}

fn default_failed_ttl_secs() -> u64 {
    86_400
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_contract() {
        let settings = QueueSettings::default();
        assert_eq!(settings.concurrency, 5);
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.backoff_ms, 500);
    }

    #[test]
    fn zero_concurrency_fails_validation() {
        let settings = QueueSettings {
            concurrency: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_attempts_fails_validation() {
        let settings = QueueSettings {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn converts_to_queue_config() {
        let settings = QueueSettings {
            backoff_ms: 250,
            ..Default::default()
        };
        let config = settings.to_queue_config();
        assert_eq!(config.backoff_base, Duration::from_millis(250));
        assert_eq!(config.concurrency, 5);
    }
}
