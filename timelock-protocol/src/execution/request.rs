use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::call::{ExecutionReceipt, PayloadCall};

/// Lifecycle status of an execution request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Queued,
    Executing,
    Executed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 5] = [
        ExecutionStatus::Queued,
        ExecutionStatus::Executing,
        ExecutionStatus::Executed,
        ExecutionStatus::Failed,
        ExecutionStatus::Cancelled,
    ];

    /// Terminal statuses are never left automatically.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Executed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Queued => "queued",
            ExecutionStatus::Executing => "executing",
            ExecutionStatus::Executed => "executed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError(pub String);

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown execution status: {}", self.0)
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for ExecutionStatus {
    type Err = ParseStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "queued" => Ok(ExecutionStatus::Queued),
            "executing" => Ok(ExecutionStatus::Executing),
            "executed" => Ok(ExecutionStatus::Executed),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" | "canceled" => Ok(ExecutionStatus::Cancelled),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Queued unit of work for one approved proposal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRequest {
    pub id: Uuid,
    pub proposal_id: String,
    /// Earliest instant execution may be attempted. Immutable after creation.
    pub eta: DateTime<Utc>,
    pub payload: Vec<PayloadCall>,
    pub status: ExecutionStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<ExecutionReceipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Ledger revision; bumped by every successful save.
    #[serde(default)]
    pub version: u64,
}

impl ExecutionRequest {
    pub fn new(
        proposal_id: impl Into<String>,
        eta: DateTime<Utc>,
        payload: Vec<PayloadCall>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            proposal_id: proposal_id.into(),
            eta,
            payload,
            status: ExecutionStatus::Queued,
            attempts: 0,
            last_attempt_at: None,
            error: None,
            receipt: None,
            executed_at: None,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Whether the timelock has elapsed at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.eta <= now
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Key handed to the executor so a resubmitted attempt can be recognised.
    /// Uses the ledger revision, which stays unique across retry resets.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn terminal_statuses() {
        let terminal: Vec<_> = ExecutionStatus::ALL
            .into_iter()
            .filter(|status| status.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                ExecutionStatus::Executed,
                ExecutionStatus::Failed,
                ExecutionStatus::Cancelled
            ]
        );
    }

    #[test]
    fn parses_status_names() {
        for status in ExecutionStatus::ALL {
            assert_eq!(status.as_str().parse::<ExecutionStatus>(), Ok(status));
        }
        assert_eq!(
            "CANCELED".parse::<ExecutionStatus>(),
            Ok(ExecutionStatus::Cancelled)
        );
        assert!("pending".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn new_request_is_queued_and_due_at_eta() {
        let now = Utc::now();
        let request = ExecutionRequest::new("prop-1", now + Duration::seconds(10), vec![], now);
        assert_eq!(request.status, ExecutionStatus::Queued);
        assert_eq!(request.attempts, 0);
        assert!(!request.is_due(now));
        assert!(request.is_due(request.eta));
        assert!(request.idempotency_key().ends_with(":0"));
    }
}
