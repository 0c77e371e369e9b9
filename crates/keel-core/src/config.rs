//! Aggregate configuration for the execution core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::failure::FailureTrackerConfig;
use crate::poll::PollConfig;
use crate::retry::RetryPolicy;
use crate::runner::RunnerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Every knob of the core in one place. Missing sections and fields fall
/// back to their defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub runner: RunnerConfig,
    pub retry: RetryPolicy,
    pub poll: PollConfig,
    pub failure: FailureTrackerConfig,
}

impl CoreConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.lock_ttl_ms == 0 {
            return Err(ConfigError::Invalid("runner.lock_ttl_ms must be > 0".into()));
        }
        if self.poll.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll.poll_interval_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn with_runner(mut self, runner: RunnerConfig) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_failure(mut self, failure: FailureTrackerConfig) -> Self {
        self.failure = failure;
        self
    }
}
