use std::env;
use std::str::FromStr;

use crate::errors::{ConfigError, CoreError};

/// Prefix of every environment variable read by the workspace.
pub const ENV_PREFIX: &str = "TIMELOCK_";

/// Runtime environment used by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

/// Process-level configuration shared by the binaries.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub database_url: Option<String>,
    pub environment: Environment,
    pub node_name: String,
    pub http_bind: String,
}

impl CoreConfig {
    /// Loads configuration from the process environment using [`ENV_PREFIX`].
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Loads configuration from env vars prefixed with the provided value.
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{}{}", prefix, suffix);

        let database_url = env::var(key("DATABASE_URL"))
            .ok()
            .filter(|value| !value.trim().is_empty());

        let environment = env::var(key("ENV"))
            .map(|raw| Environment::from_str(&raw))
            .unwrap_or_default();

        let node_name = env::var(key("NODE_NAME")).unwrap_or_else(|_| "timelock-node".to_string());
        let http_bind = env::var(key("HTTP_BIND")).unwrap_or_else(|_| "0.0.0.0:8095".to_string());

        Ok(Self {
            database_url,
            environment,
            node_name,
            http_bind,
        })
    }

    /// Returns the Postgres URL when persistence is configured.
    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }

    /// Whether the service is running in production.
    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }
}

/// Reads and parses an optional environment variable, falling back to `default`.
pub fn env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse::<T>()
                .map_err(|err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.clone(),
                    message: err.to_string(),
                })
        }
        _ => Ok(default),
    }
}

/// Reads a required environment variable.
pub fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Helper that loads config and converts to the canonical core error type.
pub fn load_core_config() -> Result<CoreConfig, CoreError> {
    Ok(CoreConfig::from_env()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_defaults_for_unknown_prefix() {
        let cfg = CoreConfig::from_env_with_prefix("TIMELOCK_TEST_DEFAULTS_").expect("config");
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.node_name, "timelock-node");
        assert!(cfg.database_url().is_none());
        assert!(!cfg.is_production());
    }

    #[test]
    fn reads_prefixed_values() {
        std::env::set_var("TIMELOCK_TEST_PREFIXED_ENV", "prod");
        std::env::set_var("TIMELOCK_TEST_PREFIXED_DATABASE_URL", "postgres://example");
        let cfg = CoreConfig::from_env_with_prefix("TIMELOCK_TEST_PREFIXED_").expect("config");
        assert!(cfg.is_production());
        assert_eq!(cfg.database_url(), Some("postgres://example"));
    }

    #[test]
    fn env_or_rejects_garbage() {
        std::env::set_var("TIMELOCK_TEST_ENV_OR_GARBAGE", "five");
        let err = env_or::<u64>("TIMELOCK_TEST_ENV_OR_GARBAGE", 5).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert_eq!(env_or::<u64>("TIMELOCK_TEST_ENV_OR_UNSET", 7).unwrap(), 7);
    }

    #[test]
    fn env_required_reports_missing_key() {
        let err = env_required("TIMELOCK_TEST_REQUIRED_UNSET").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "TIMELOCK_TEST_REQUIRED_UNSET"));
    }
}
