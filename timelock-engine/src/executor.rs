use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use timelock_protocol::execution::{ExecutionReceipt, ExecutionRequest, PayloadCall};
use uuid::Uuid;

/// Everything an adapter needs to commit one attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionCall {
    pub request_id: Uuid,
    pub proposal_id: String,
    pub attempt: u32,
    /// Stable per attempt: `<request id>:<claimed revision>`.
    pub idempotency_key: String,
    pub calls: Vec<PayloadCall>,
}

impl ExecutionCall {
    /// Builds the call for a request that has already been claimed, so
    /// `attempts` is the number of the attempt being made.
    pub fn for_request(request: &ExecutionRequest) -> Self {
        Self {
            request_id: request.id,
            proposal_id: request.proposal_id.clone(),
            attempt: request.attempts,
            idempotency_key: request.idempotency_key(),
            calls: request.payload.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Worth retrying within the attempt budget.
    Transient,
    /// Retrying cannot help.
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => f.write_str("transient"),
            FailureKind::Permanent => f.write_str("permanent"),
        }
    }
}

const TRANSIENT_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "timeout",
    "timed out",
    "temporary failure",
    "nonce too low",
    "replacement transaction underpriced",
    "network error",
    "eof",
];

/// Failure reported by an executor adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("execution failed ({kind}): {message}")]
pub struct ExecutionError {
    pub kind: FailureKind,
    pub message: String,
}

impl ExecutionError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }

    /// Classifies free-form failure text from a node or relayer.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_ascii_lowercase();
        if TRANSIENT_PATTERNS
            .iter()
            .any(|pattern| lowered.contains(pattern))
        {
            Self::transient(message)
        } else {
            Self::permanent(message)
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

/// Performs the irreversible commit of an approved proposal.
///
/// Implementations enforce their own timeout; the scheduler never cancels an
/// in-flight call. Resubmission of the same attempt is not guaranteed to be
/// idempotent unless the adapter honours [`ExecutionCall::idempotency_key`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutorAdapter: Send + Sync + 'static {
    async fn execute(&self, call: &ExecutionCall) -> Result<ExecutionReceipt, ExecutionError>;
}
