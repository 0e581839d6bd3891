use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::config::CoreConfig;
use crate::errors::{CoreError, Result};

/// Wrapper around the Postgres connection pool backing the durable ledger.
#[derive(Clone)]
pub struct DatabasePool {
    pool: Pool<Postgres>,
}

impl DatabasePool {
    /// Establishes a new connection pool based on the core configuration.
    pub async fn connect(config: &CoreConfig) -> Result<Self> {
        let url = config
            .database_url()
            .ok_or_else(|| CoreError::Config("database url is not configured".into()))?;
        Self::connect_with_url(url).await
    }

    /// Establishes a connection pool directly from a database URL.
    pub async fn connect_with_url(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn inner(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_requires_a_database_url() {
        let config = CoreConfig {
            database_url: None,
            environment: Default::default(),
            node_name: "test".into(),
            http_bind: "127.0.0.1:0".into(),
        };
        let result = DatabasePool::connect(&config).await;
        assert!(matches!(result, Err(CoreError::Config(_))));
    }
}
