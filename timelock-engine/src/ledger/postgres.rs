use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, QueryBuilder};
use timelock_core::config::CoreConfig;
use timelock_core::db::DatabasePool;
use timelock_protocol::execution::{
    ExecutionQuery, ExecutionReceipt, ExecutionRequest, ExecutionStatus, PayloadCall,
};
use uuid::Uuid;

use super::ExecutionLedger;
use crate::error::LedgerError;

const COLUMNS: &str = "id, proposal_id, eta, payload, status, attempts, last_attempt_at, \
     error, receipt, executed_at, cancelled_by, created_at, updated_at, version";

/// Postgres-backed ledger. Conditional writes compare the `version` column so
/// concurrent schedulers and operators get exactly one winner per revision.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: DatabasePool,
}

impl PostgresLedger {
    /// Connects using the supplied configuration and runs the embedded migrations.
    pub async fn from_config(config: &CoreConfig) -> Result<Self, LedgerError> {
        let pool = DatabasePool::connect(config)
            .await
            .map_err(|err| LedgerError::Storage(err.to_string()))?;
        Self::from_pool(pool).await
    }

    /// Builds the ledger from an existing pool and ensures migrations ran.
    pub async fn from_pool(pool: DatabasePool) -> Result<Self, LedgerError> {
        sqlx::migrate!("./migrations")
            .run(pool.inner())
            .await
            .map_err(|err| LedgerError::Storage(err.to_string()))?;
        Ok(Self { pool })
    }

    async fn exists(&self, id: Uuid) -> Result<bool, LedgerError> {
        let found: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM execution_requests WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.inner())
                .await?;
        Ok(found.is_some())
    }
}

fn map_write_error(err: sqlx::Error, proposal_id: &str) -> LedgerError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return LedgerError::Duplicate {
                proposal_id: proposal_id.to_string(),
            };
        }
    }
    LedgerError::from(err)
}

#[async_trait]
impl ExecutionLedger for PostgresLedger {
    async fn enqueue(
        &self,
        proposal_id: &str,
        eta: DateTime<Utc>,
        payload: Vec<PayloadCall>,
        now: DateTime<Utc>,
    ) -> Result<ExecutionRequest, LedgerError> {
        let request = ExecutionRequest::new(proposal_id, eta, payload, now);
        let sql = format!(
            r#"
            INSERT INTO execution_requests (
                id, proposal_id, eta, payload, status, attempts,
                created_at, updated_at, version
            ) VALUES ($1, $2, $3, $4, $5, 0, $6, $6, 1)
            RETURNING {COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(request.id)
            .bind(&request.proposal_id)
            .bind(request.eta)
            .bind(Json(&request.payload))
            .bind(request.status.as_str())
            .bind(request.created_at)
            .fetch_one(self.pool.inner())
            .await
            .map_err(|err| map_write_error(err, proposal_id))?;

        row.try_into()
    }

    async fn get(&self, proposal_id: &str) -> Result<Option<ExecutionRequest>, LedgerError> {
        let sql = format!(
            r#"
            SELECT {COLUMNS}
            FROM execution_requests
            WHERE proposal_id = $1
            ORDER BY (status IN ('queued', 'executing')) DESC, created_at DESC
            LIMIT 1
            "#
        );

        let row = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(proposal_id)
            .fetch_optional(self.pool.inner())
            .await?;

        row.map(ExecutionRequest::try_from).transpose()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ExecutionRequest>, LedgerError> {
        let sql = format!("SELECT {COLUMNS} FROM execution_requests WHERE id = $1");
        let row = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool.inner())
            .await?;

        row.map(ExecutionRequest::try_from).transpose()
    }

    async fn list(&self, query: &ExecutionQuery) -> Result<Vec<ExecutionRequest>, LedgerError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {COLUMNS} FROM execution_requests WHERE 1=1"
        ));

        if let Some(status) = query.status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }

        if let Some(proposal_id) = &query.proposal_id {
            builder.push(" AND proposal_id = ");
            builder.push_bind(proposal_id.clone());
        }

        if let Some(due_before) = query.due_before {
            builder.push(" AND eta <= ");
            builder.push_bind(due_before);
        }

        builder.push(" ORDER BY eta ASC, created_at ASC");

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit.max(0));
        }

        let rows = builder
            .build_query_as::<ExecutionRow>()
            .fetch_all(self.pool.inner())
            .await?;

        rows.into_iter().map(ExecutionRequest::try_from).collect()
    }

    async fn save(&self, request: &ExecutionRequest) -> Result<ExecutionRequest, LedgerError> {
        let sql = format!(
            r#"
            UPDATE execution_requests SET
                status = $3,
                attempts = $4,
                last_attempt_at = $5,
                error = $6,
                receipt = $7,
                executed_at = $8,
                cancelled_by = $9,
                updated_at = $10,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(request.id)
            .bind(request.version as i64)
            .bind(request.status.as_str())
            .bind(request.attempts as i32)
            .bind(request.last_attempt_at)
            .bind(&request.error)
            .bind(request.receipt.as_ref().map(Json))
            .bind(request.executed_at)
            .bind(&request.cancelled_by)
            .bind(request.updated_at)
            .fetch_optional(self.pool.inner())
            .await
            .map_err(|err| map_write_error(err, &request.proposal_id))?;

        if let Some(row) = row {
            return row.try_into();
        }

        if self.exists(request.id).await? {
            Err(LedgerError::Conflict {
                id: request.id,
                expected: request.version,
            })
        } else {
            Err(LedgerError::NotFound(request.id.to_string()))
        }
    }
}

#[derive(FromRow)]
struct ExecutionRow {
    id: Uuid,
    proposal_id: String,
    eta: DateTime<Utc>,
    payload: Json<Vec<PayloadCall>>,
    status: String,
    attempts: i32,
    last_attempt_at: Option<DateTime<Utc>>,
    error: Option<String>,
    receipt: Option<Json<ExecutionReceipt>>,
    executed_at: Option<DateTime<Utc>>,
    cancelled_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<ExecutionRow> for ExecutionRequest {
    type Error = LedgerError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<ExecutionStatus>()
            .map_err(|err| LedgerError::Storage(err.to_string()))?;
        let attempts = u32::try_from(row.attempts)
            .map_err(|_| LedgerError::Storage(format!("negative attempts for {}", row.id)))?;

        Ok(ExecutionRequest {
            id: row.id,
            proposal_id: row.proposal_id,
            eta: row.eta,
            payload: row.payload.0,
            status,
            attempts,
            last_attempt_at: row.last_attempt_at,
            error: row.error,
            receipt: row.receipt.map(|receipt| receipt.0),
            executed_at: row.executed_at,
            cancelled_by: row.cancelled_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version.max(0) as u64,
        })
    }
}
