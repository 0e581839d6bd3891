use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::request::{ExecutionRequest, ExecutionStatus};

/// State transitions reported to lifecycle notifiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    Queued,
    Started,
    Succeeded,
    /// Attempt failed, another one is still pending.
    Failed,
    GaveUp,
    Cancelled,
    Reset,
}

impl LifecycleEventKind {
    pub fn name(self) -> &'static str {
        match self {
            LifecycleEventKind::Queued => "execution.queued",
            LifecycleEventKind::Started => "execution.started",
            LifecycleEventKind::Succeeded => "execution.succeeded",
            LifecycleEventKind::Failed => "execution.failed",
            LifecycleEventKind::GaveUp => "execution.gave_up",
            LifecycleEventKind::Cancelled => "execution.cancelled",
            LifecycleEventKind::Reset => "execution.reset",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifecycleEvent {
    pub event: String,
    pub kind: LifecycleEventKind,
    pub request_id: Uuid,
    pub proposal_id: String,
    pub status: ExecutionStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleEventKind, request: &ExecutionRequest, at: DateTime<Utc>) -> Self {
        Self {
            event: kind.name().to_string(),
            kind,
            request_id: request.id,
            proposal_id: request.proposal_id.clone(),
            status: request.status,
            attempts: request.attempts,
            actor: None,
            error: request.error.clone(),
            tx_hash: request.receipt.as_ref().map(|receipt| receipt.tx_hash.clone()),
            occurred_at: at,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.event
    }
}
