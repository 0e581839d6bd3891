use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use timelock_protocol::execution::{ExecutionQuery, ExecutionRequest, PayloadCall};
use uuid::Uuid;

use super::ExecutionLedger;
use crate::error::LedgerError;

/// Process-local ledger. Clones share the same storage.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    inner: Arc<RwLock<HashMap<Uuid, ExecutionRequest>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

fn has_other_active(
    requests: &HashMap<Uuid, ExecutionRequest>,
    proposal_id: &str,
    except: Option<Uuid>,
) -> bool {
    requests.values().any(|existing| {
        existing.proposal_id == proposal_id
            && existing.is_active()
            && Some(existing.id) != except
    })
}

#[async_trait]
impl ExecutionLedger for InMemoryLedger {
    async fn enqueue(
        &self,
        proposal_id: &str,
        eta: DateTime<Utc>,
        payload: Vec<PayloadCall>,
        now: DateTime<Utc>,
    ) -> Result<ExecutionRequest, LedgerError> {
        let mut inner = self.inner.write();
        if has_other_active(&inner, proposal_id, None) {
            return Err(LedgerError::Duplicate {
                proposal_id: proposal_id.to_string(),
            });
        }

        let mut request = ExecutionRequest::new(proposal_id, eta, payload, now);
        request.version = 1;
        inner.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get(&self, proposal_id: &str) -> Result<Option<ExecutionRequest>, LedgerError> {
        let inner = self.inner.read();
        let found = inner
            .values()
            .filter(|request| request.proposal_id == proposal_id)
            .max_by_key(|request| (request.is_active(), request.created_at))
            .cloned();
        Ok(found)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ExecutionRequest>, LedgerError> {
        Ok(self.inner.read().get(&id).cloned())
    }

    async fn list(&self, query: &ExecutionQuery) -> Result<Vec<ExecutionRequest>, LedgerError> {
        let inner = self.inner.read();
        let mut matches: Vec<ExecutionRequest> = inner
            .values()
            .filter(|request| query.matches(request))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            a.eta
                .cmp(&b.eta)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        if let Some(limit) = query.limit {
            matches.truncate(limit.max(0) as usize);
        }
        Ok(matches)
    }

    async fn save(&self, request: &ExecutionRequest) -> Result<ExecutionRequest, LedgerError> {
        let mut inner = self.inner.write();
        let current = inner
            .get(&request.id)
            .ok_or_else(|| LedgerError::NotFound(request.id.to_string()))?;

        if current.version != request.version {
            return Err(LedgerError::Conflict {
                id: request.id,
                expected: request.version,
            });
        }

        if request.is_active()
            && !current.is_active()
            && has_other_active(&inner, &request.proposal_id, Some(request.id))
        {
            return Err(LedgerError::Duplicate {
                proposal_id: request.proposal_id.clone(),
            });
        }

        let mut stored = request.clone();
        stored.version = request.version + 1;
        inner.insert(stored.id, stored.clone());
        Ok(stored)
    }
}
