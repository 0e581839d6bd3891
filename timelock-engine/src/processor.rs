//! Drives queued executions through the executor once their timelock elapses.
//!
//! State machine:
//!
//! ```text
//!            tick / manual            success
//!  QUEUED ─────────────────▶ EXECUTING ─────────▶ EXECUTED
//!    ▲  │                        │
//!    │  │ cancel                 │ failure, budget left
//!    │  ▼                        ▼
//!    │ CANCELLED               QUEUED
//!    │                           │ failure, budget spent / permanent
//!    │ retry reset               ▼
//!    └──────────────────────── FAILED
//! ```
//!
//! Only one automatic pass runs at a time per processor. Races with operator
//! actions and other processors are settled by the ledger's conditional save.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use timelock_protocol::execution::{
    AttemptOutcome, ExecutionQuery, ExecutionRequest, ExecutionStatus, LifecycleEvent,
    LifecycleEventKind, PayloadCall,
};
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::SchedulerError;
use crate::executor::{ExecutionCall, ExecutorAdapter};
use crate::ledger::ExecutionLedger;
use crate::notifier::{LifecycleNotifier, TracingNotifier};
use crate::retry::{FixedDelayPolicy, RetryDecision, RetryPolicy};

/// Summary of one automatic pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// The pass did not run because another one was in progress.
    pub skipped: bool,
    pub examined: usize,
    pub executed: usize,
    pub retried: usize,
    pub gave_up: usize,
    pub deferred: usize,
    pub conflicts: usize,
    pub errors: usize,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// No request changed state during the pass.
    pub fn is_noop(&self) -> bool {
        self.executed == 0 && self.retried == 0 && self.gave_up == 0
    }

    fn record(&mut self, outcome: &AttemptOutcome) {
        match outcome {
            AttemptOutcome::Executed(_) => self.executed += 1,
            AttemptOutcome::Retrying(_) => self.retried += 1,
            AttemptOutcome::GaveUp(_) => self.gave_up += 1,
        }
    }
}

enum DueAction {
    Deferred,
    Processed(AttemptOutcome),
}

struct PassGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct ExecutionProcessorBuilder {
    ledger: Arc<dyn ExecutionLedger>,
    executor: Arc<dyn ExecutorAdapter>,
    policy: Arc<dyn RetryPolicy>,
    notifier: Arc<dyn LifecycleNotifier>,
    clock: Arc<dyn Clock>,
}

impl ExecutionProcessorBuilder {
    pub fn policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn LifecycleNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> ExecutionProcessor {
        ExecutionProcessor {
            ledger: self.ledger,
            executor: self.executor,
            policy: self.policy,
            notifier: self.notifier,
            clock: self.clock,
            pass_in_progress: AtomicBool::new(false),
        }
    }
}

/// Scheduler core. Holds no authoritative state besides the pass guard.
pub struct ExecutionProcessor {
    ledger: Arc<dyn ExecutionLedger>,
    executor: Arc<dyn ExecutorAdapter>,
    policy: Arc<dyn RetryPolicy>,
    notifier: Arc<dyn LifecycleNotifier>,
    clock: Arc<dyn Clock>,
    pass_in_progress: AtomicBool,
}

impl ExecutionProcessor {
    /// Starts a builder with the default policy, a tracing notifier and the
    /// system clock.
    pub fn builder(
        ledger: Arc<dyn ExecutionLedger>,
        executor: Arc<dyn ExecutorAdapter>,
    ) -> ExecutionProcessorBuilder {
        ExecutionProcessorBuilder {
            ledger,
            executor,
            policy: Arc::new(FixedDelayPolicy::default()),
            notifier: Arc::new(TracingNotifier),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn pass_in_progress(&self) -> bool {
        self.pass_in_progress.load(Ordering::Acquire)
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts()
    }

    /// Queues a new execution for an approved proposal.
    pub async fn enqueue(
        &self,
        proposal_id: &str,
        eta: DateTime<Utc>,
        payload: Vec<PayloadCall>,
    ) -> Result<ExecutionRequest, SchedulerError> {
        let proposal_id = proposal_id.trim();
        if proposal_id.is_empty() {
            return Err(SchedulerError::InvalidRequest(
                "proposal id must not be empty".into(),
            ));
        }
        if payload.is_empty() {
            return Err(SchedulerError::InvalidRequest(
                "payload must contain at least one call".into(),
            ));
        }
        if payload.iter().any(|call| call.target.trim().is_empty()) {
            return Err(SchedulerError::InvalidRequest(
                "every call needs a target".into(),
            ));
        }

        let now = self.clock.now();
        let request = self.ledger.enqueue(proposal_id, eta, payload, now).await?;
        info!(
            request_id = %request.id,
            proposal_id = %request.proposal_id,
            eta = %request.eta,
            calls = request.payload.len(),
            "execution queued"
        );
        self.emit(LifecycleEventKind::Queued, &request, None);
        Ok(request)
    }

    pub async fn get_status(&self, proposal_id: &str) -> Result<ExecutionRequest, SchedulerError> {
        self.ledger
            .get(proposal_id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(proposal_id.to_string()))
    }

    pub async fn list_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<ExecutionRequest>, SchedulerError> {
        self.list(&ExecutionQuery::by_status(status)).await
    }

    pub async fn list(
        &self,
        query: &ExecutionQuery,
    ) -> Result<Vec<ExecutionRequest>, SchedulerError> {
        Ok(self.ledger.list(query).await?)
    }

    /// Runs one automatic pass over every due QUEUED request.
    ///
    /// Returns a skipped report without touching the ledger when a previous
    /// pass is still running. A failure on one request never stops the pass.
    pub async fn run_tick(&self) -> Result<TickReport, SchedulerError> {
        let Some(_guard) = PassGuard::acquire(&self.pass_in_progress) else {
            debug!("previous scheduler pass still running; skipping tick");
            return Ok(TickReport::skipped());
        };

        let now = self.clock.now();
        let due = self.ledger.list(&ExecutionQuery::due(now)).await?;
        let mut report = TickReport {
            examined: due.len(),
            ..TickReport::default()
        };

        for request in due {
            let request_id = request.id;
            match self.process_due(request, now).await {
                Ok(DueAction::Deferred) => report.deferred += 1,
                Ok(DueAction::Processed(outcome)) => report.record(&outcome),
                Err(SchedulerError::Conflict { id }) => {
                    debug!(request_id = %id, "request changed under the scheduler; skipping");
                    report.conflicts += 1;
                }
                Err(err) => {
                    error!(request_id = %request_id, error = %err, "failed to process due execution");
                    report.errors += 1;
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                executed = report.executed,
                retried = report.retried,
                gave_up = report.gave_up,
                deferred = report.deferred,
                conflicts = report.conflicts,
                errors = report.errors,
                "scheduler pass finished"
            );
        }

        Ok(report)
    }

    async fn process_due(
        &self,
        request: ExecutionRequest,
        now: DateTime<Utc>,
    ) -> Result<DueAction, SchedulerError> {
        match self
            .policy
            .next_action(request.attempts, request.last_attempt_at, now)
        {
            RetryDecision::Backoff { until } if until > now => {
                debug!(request_id = %request.id, %until, "execution backing off");
                Ok(DueAction::Deferred)
            }
            RetryDecision::GiveUp => Ok(DueAction::Processed(self.give_up(request, None).await?)),
            _ => Ok(DueAction::Processed(self.attempt(request, None).await?)),
        }
    }

    /// Executes a due request immediately instead of waiting for the next
    /// tick. Backoff spacing is skipped; the eta and attempt budget are not.
    pub async fn manual_execute(
        &self,
        proposal_id: &str,
        actor: &str,
    ) -> Result<AttemptOutcome, SchedulerError> {
        let actor = require_actor(actor)?;
        let request = self.get_status(proposal_id).await?;

        if request.status != ExecutionStatus::Queued {
            return Err(invalid_state(&request, "execute"));
        }

        let now = self.clock.now();
        if !request.is_due(now) {
            return Err(SchedulerError::TimelockNotElapsed {
                proposal_id: request.proposal_id,
                eta: request.eta,
            });
        }

        info!(
            request_id = %request.id,
            proposal_id = %request.proposal_id,
            actor,
            "manual execution requested"
        );

        if request.attempts >= self.policy.max_attempts() {
            return self.give_up(request, Some(actor)).await;
        }

        self.attempt(request, Some(actor)).await
    }

    /// Cancels a request that has not started executing.
    pub async fn cancel(
        &self,
        proposal_id: &str,
        actor: &str,
    ) -> Result<ExecutionRequest, SchedulerError> {
        let actor = require_actor(actor)?;
        let mut request = self.get_status(proposal_id).await?;

        if request.status != ExecutionStatus::Queued {
            return Err(invalid_state(&request, "cancel"));
        }

        request.status = ExecutionStatus::Cancelled;
        request.cancelled_by = Some(actor.to_string());
        request.updated_at = self.clock.now();

        let stored = self.ledger.save(&request).await?;
        info!(
            request_id = %stored.id,
            proposal_id = %stored.proposal_id,
            actor,
            "execution cancelled"
        );
        self.emit(LifecycleEventKind::Cancelled, &stored, Some(actor));
        Ok(stored)
    }

    /// Puts a FAILED request back in the queue with a fresh attempt budget.
    pub async fn retry_reset(&self, proposal_id: &str) -> Result<ExecutionRequest, SchedulerError> {
        let mut request = self.get_status(proposal_id).await?;

        if request.status != ExecutionStatus::Failed {
            return Err(invalid_state(&request, "reset"));
        }

        request.status = ExecutionStatus::Queued;
        request.attempts = 0;
        request.error = None;
        request.last_attempt_at = None;
        request.updated_at = self.clock.now();

        let stored = self.ledger.save(&request).await?;
        info!(
            request_id = %stored.id,
            proposal_id = %stored.proposal_id,
            "execution reset for retry"
        );
        self.emit(LifecycleEventKind::Reset, &stored, None);
        Ok(stored)
    }

    /// Claims the request, calls the executor and records the result.
    async fn attempt(
        &self,
        request: ExecutionRequest,
        actor: Option<&str>,
    ) -> Result<AttemptOutcome, SchedulerError> {
        let started_at = self.clock.now();
        let mut claim = request;
        claim.status = ExecutionStatus::Executing;
        claim.attempts += 1;
        claim.last_attempt_at = Some(started_at);
        claim.updated_at = started_at;

        let claimed = self.ledger.save(&claim).await?;
        self.emit(LifecycleEventKind::Started, &claimed, actor);

        let call = ExecutionCall::for_request(&claimed);
        let result = self.executor.execute(&call).await;

        let finished_at = self.clock.now();
        let mut next = claimed.clone();
        next.updated_at = finished_at;

        match result {
            Ok(receipt) => {
                let tx_hash = receipt.tx_hash.clone();
                next.status = ExecutionStatus::Executed;
                next.receipt = Some(receipt);
                next.executed_at = Some(finished_at);
                next.error = None;

                let stored = self.ledger.save(&next).await.map_err(|err| {
                    error!(
                        request_id = %next.id,
                        proposal_id = %next.proposal_id,
                        %tx_hash,
                        error = %err,
                        "execution committed but the ledger update failed"
                    );
                    err
                })?;
                info!(
                    request_id = %stored.id,
                    proposal_id = %stored.proposal_id,
                    attempt = stored.attempts,
                    %tx_hash,
                    "execution succeeded"
                );
                self.emit(LifecycleEventKind::Succeeded, &stored, actor);
                Ok(AttemptOutcome::Executed(stored))
            }
            Err(failure) => {
                next.error = Some(failure.message.clone());
                let exhausted = !failure.is_retryable()
                    || self.policy.next_action(next.attempts, next.last_attempt_at, finished_at)
                        == RetryDecision::GiveUp;

                if exhausted {
                    next.status = ExecutionStatus::Failed;
                    let stored = self.ledger.save(&next).await?;
                    warn!(
                        request_id = %stored.id,
                        proposal_id = %stored.proposal_id,
                        attempt = stored.attempts,
                        kind = %failure.kind,
                        error = %failure.message,
                        "execution failed; giving up"
                    );
                    self.emit(LifecycleEventKind::GaveUp, &stored, actor);
                    Ok(AttemptOutcome::GaveUp(stored))
                } else {
                    next.status = ExecutionStatus::Queued;
                    let stored = self.ledger.save(&next).await?;
                    warn!(
                        request_id = %stored.id,
                        proposal_id = %stored.proposal_id,
                        attempt = stored.attempts,
                        max_attempts = self.policy.max_attempts(),
                        error = %failure.message,
                        "execution failed; will retry"
                    );
                    self.emit(LifecycleEventKind::Failed, &stored, actor);
                    Ok(AttemptOutcome::Retrying(stored))
                }
            }
        }
    }

    async fn give_up(
        &self,
        mut request: ExecutionRequest,
        actor: Option<&str>,
    ) -> Result<AttemptOutcome, SchedulerError> {
        request.status = ExecutionStatus::Failed;
        request.updated_at = self.clock.now();
        if request.error.is_none() {
            request.error = Some("retry budget exhausted".to_string());
        }

        let stored = self.ledger.save(&request).await?;
        warn!(
            request_id = %stored.id,
            proposal_id = %stored.proposal_id,
            attempts = stored.attempts,
            "retry budget exhausted; giving up"
        );
        self.emit(LifecycleEventKind::GaveUp, &stored, actor);
        Ok(AttemptOutcome::GaveUp(stored))
    }

    fn emit(&self, kind: LifecycleEventKind, request: &ExecutionRequest, actor: Option<&str>) {
        let mut event = LifecycleEvent::new(kind, request, self.clock.now());
        if let Some(actor) = actor {
            event = event.with_actor(actor);
        }
        self.notifier.emit(&event);
    }
}

fn require_actor(actor: &str) -> Result<&str, SchedulerError> {
    let actor = actor.trim();
    if actor.is_empty() {
        Err(SchedulerError::InvalidRequest("actor is required".into()))
    } else {
        Ok(actor)
    }
}

fn invalid_state(request: &ExecutionRequest, operation: &'static str) -> SchedulerError {
    SchedulerError::InvalidState {
        proposal_id: request.proposal_id.clone(),
        status: request.status,
        operation,
    }
}
