//! Request and response bodies of the scheduler HTTP service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::PayloadCall;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueExecutionRequest {
    pub proposal_id: String,
    pub eta: DateTime<Utc>,
    pub payload: Vec<PayloadCall>,
}

/// Body of the manual execute and cancel operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorActionRequest {
    pub actor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}
