//! Durable record of execution requests.
//!
//! Every write goes through [`ExecutionLedger::save`], a conditional update
//! keyed on the request `version`. A writer holding a stale copy is rejected
//! with [`LedgerError::Conflict`] instead of overwriting a newer state, which
//! is what serializes the automatic tick against operator actions and
//! against other scheduler instances.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use timelock_protocol::execution::{ExecutionQuery, ExecutionRequest, PayloadCall};
use uuid::Uuid;

use crate::error::LedgerError;

pub use memory::InMemoryLedger;
pub use postgres::PostgresLedger;

#[async_trait]
pub trait ExecutionLedger: Send + Sync + 'static {
    /// Creates a QUEUED request. Fails with [`LedgerError::Duplicate`] when
    /// the proposal already has an active request.
    async fn enqueue(
        &self,
        proposal_id: &str,
        eta: DateTime<Utc>,
        payload: Vec<PayloadCall>,
        now: DateTime<Utc>,
    ) -> Result<ExecutionRequest, LedgerError>;

    /// Active request for the proposal, or its most recent one.
    async fn get(&self, proposal_id: &str) -> Result<Option<ExecutionRequest>, LedgerError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ExecutionRequest>, LedgerError>;

    /// Matching requests ordered by eta, then creation time.
    async fn list(&self, query: &ExecutionQuery) -> Result<Vec<ExecutionRequest>, LedgerError>;

    /// Atomically replaces the stored request if its version still matches
    /// `request.version`, returning the stored copy with the bumped version.
    async fn save(&self, request: &ExecutionRequest) -> Result<ExecutionRequest, LedgerError>;
}
