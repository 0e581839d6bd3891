use serde::{Deserialize, Serialize};

use super::request::ExecutionRequest;

/// Result of driving a single attempt through the executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", content = "request", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Executed(ExecutionRequest),
    /// The attempt failed and the request went back to the queue.
    Retrying(ExecutionRequest),
    GaveUp(ExecutionRequest),
}

impl AttemptOutcome {
    pub fn request(&self) -> &ExecutionRequest {
        match self {
            AttemptOutcome::Executed(request)
            | AttemptOutcome::Retrying(request)
            | AttemptOutcome::GaveUp(request) => request,
        }
    }

    pub fn into_request(self) -> ExecutionRequest {
        match self {
            AttemptOutcome::Executed(request)
            | AttemptOutcome::Retrying(request)
            | AttemptOutcome::GaveUp(request) => request,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Executed(_))
    }
}
