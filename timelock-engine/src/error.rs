use chrono::{DateTime, Utc};
use thiserror::Error;
use timelock_protocol::execution::ExecutionStatus;
use uuid::Uuid;

use crate::executor::ExecutionError;

/// Errors raised by an execution ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("an active execution already exists for proposal {proposal_id}")]
    Duplicate { proposal_id: String },
    #[error("execution request not found: {0}")]
    NotFound(String),
    #[error("execution request {id} was modified concurrently (expected version {expected})")]
    Conflict { id: Uuid, expected: u64 },
    #[error("ledger storage failure: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

/// Errors surfaced to callers of the scheduler API.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("an active execution already exists for proposal {proposal_id}")]
    Duplicate { proposal_id: String },
    #[error("no execution found for proposal {0}")]
    NotFound(String),
    #[error("timelock for proposal {proposal_id} has not elapsed (eta {eta})")]
    TimelockNotElapsed {
        proposal_id: String,
        eta: DateTime<Utc>,
    },
    #[error("cannot {operation} proposal {proposal_id} while {status}")]
    InvalidState {
        proposal_id: String,
        status: ExecutionStatus,
        operation: &'static str,
    },
    #[error("execution request {id} was modified concurrently")]
    Conflict { id: Uuid },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<LedgerError> for SchedulerError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Duplicate { proposal_id } => SchedulerError::Duplicate { proposal_id },
            LedgerError::NotFound(id) => SchedulerError::NotFound(id),
            LedgerError::Conflict { id, .. } => SchedulerError::Conflict { id },
            LedgerError::Storage(message) => SchedulerError::Storage(message),
        }
    }
}
