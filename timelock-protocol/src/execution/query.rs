use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::{ExecutionRequest, ExecutionStatus};

/// Filters for listing execution requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionQuery {
    pub status: Option<ExecutionStatus>,
    pub proposal_id: Option<String>,
    /// Only requests whose eta is at or before this instant.
    pub due_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl ExecutionQuery {
    pub fn by_status(status: ExecutionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// QUEUED requests whose timelock elapsed at `now`.
    pub fn due(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(ExecutionStatus::Queued),
            due_before: Some(now),
            ..Self::default()
        }
    }

    pub fn matches(&self, request: &ExecutionRequest) -> bool {
        if let Some(status) = self.status {
            if request.status != status {
                return false;
            }
        }
        if let Some(proposal_id) = &self.proposal_id {
            if &request.proposal_id != proposal_id {
                return false;
            }
        }
        if let Some(due_before) = self.due_before {
            if request.eta > due_before {
                return false;
            }
        }
        true
    }
}
