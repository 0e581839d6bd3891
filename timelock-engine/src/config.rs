use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use timelock_core::config::{env_or, env_required, CoreConfig, ENV_PREFIX};
use timelock_core::errors::ConfigError;

use crate::retry::{ExponentialBackoffPolicy, FixedDelayPolicy, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Fixed,
    Exponential,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::Fixed
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryStrategy::Fixed => f.write_str("fixed"),
            RetryStrategy::Exponential => f.write_str("exponential"),
        }
    }
}

impl FromStr for RetryStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(RetryStrategy::Fixed),
            "exponential" | "exp" => Ok(RetryStrategy::Exponential),
            other => Err(format!("expected `fixed` or `exponential`, got `{other}`")),
        }
    }
}

/// Settings of the scheduler service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_min_retry_delay_secs")]
    pub min_retry_delay_secs: u64,
    #[serde(default)]
    pub retry_strategy: RetryStrategy,
    #[serde(default)]
    pub executor_url: Option<String>,
    #[serde(default = "default_executor_timeout_secs")]
    pub executor_timeout_secs: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0:8095".to_string()
}

fn default_tick_interval_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_min_retry_delay_secs() -> u64 {
    60
}

fn default_executor_timeout_secs() -> u64 {
    30
}

fn default_event_buffer() -> usize {
    256
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            tick_interval_secs: default_tick_interval_secs(),
            max_attempts: default_max_attempts(),
            min_retry_delay_secs: default_min_retry_delay_secs(),
            retry_strategy: RetryStrategy::default(),
            executor_url: None,
            executor_timeout_secs: default_executor_timeout_secs(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl SchedulerConfig {
    /// Reads the `TIMELOCK_*` variables on top of the shared core settings.
    pub fn from_env(core: &CoreConfig) -> Result<Self, ConfigError> {
        Self::from_env_with_prefix(core, ENV_PREFIX)
    }

    pub fn from_env_with_prefix(core: &CoreConfig, prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{}{}", prefix, suffix);
        let config = Self {
            bind_address: core.http_bind.clone(),
            tick_interval_secs: env_or(&key("TICK_INTERVAL_SECS"), default_tick_interval_secs())?,
            max_attempts: env_or(&key("MAX_ATTEMPTS"), default_max_attempts())?,
            min_retry_delay_secs: env_or(
                &key("MIN_RETRY_DELAY_SECS"),
                default_min_retry_delay_secs(),
            )?,
            retry_strategy: env_or(&key("RETRY_STRATEGY"), RetryStrategy::default())?,
            executor_url: env_required(&key("EXECUTOR_URL")).ok(),
            executor_timeout_secs: env_or(
                &key("EXECUTOR_TIMEOUT_SECS"),
                default_executor_timeout_secs(),
            )?,
            event_buffer: env_or(&key("EVENT_BUFFER"), default_event_buffer())?,
        };
        config.validate(prefix)?;
        Ok(config)
    }

    fn validate(&self, prefix: &str) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: format!("{prefix}MAX_ATTEMPTS"),
                value: "0".into(),
                message: "at least one attempt is required".into(),
            });
        }
        if self.tick_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: format!("{prefix}TICK_INTERVAL_SECS"),
                value: "0".into(),
                message: "interval must be positive".into(),
            });
        }
        Ok(())
    }

    /// Executor endpoint; the service cannot run without one.
    pub fn executor_url(&self) -> Result<&str, ConfigError> {
        self.executor_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar(format!("{ENV_PREFIX}EXECUTOR_URL")))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn executor_timeout(&self) -> Duration {
        Duration::from_secs(self.executor_timeout_secs)
    }

    pub fn retry_policy(&self) -> Arc<dyn RetryPolicy> {
        let delay = chrono::Duration::seconds(self.min_retry_delay_secs as i64);
        match self.retry_strategy {
            RetryStrategy::Fixed => Arc::new(FixedDelayPolicy::new(self.max_attempts, delay)),
            RetryStrategy::Exponential => {
                Arc::new(ExponentialBackoffPolicy::new(self.max_attempts, delay))
            }
        }
    }
}
