use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use timelock_protocol::api::{EnqueueExecutionRequest, ErrorResponse, OperatorActionRequest};
use timelock_protocol::execution::{
    AttemptOutcome, ExecutionQuery, ExecutionRequest, ExecutionStatus, LifecycleEvent,
};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::notifier::BroadcastNotifier;
use crate::processor::ExecutionProcessor;
use crate::runtime::SchedulerRuntime;

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Clone)]
struct SchedulerApiState {
    processor: Arc<ExecutionProcessor>,
    events: BroadcastNotifier,
}

impl SchedulerApiState {
    fn processor(&self) -> &ExecutionProcessor {
        &self.processor
    }
}

/// Running HTTP service together with its scheduler loop.
pub struct RunningService {
    pub local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RunningService {
    /// Stops accepting requests, then stops the scheduler loop.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.task.await {
            warn!("scheduler service task crashed: {:?}", err);
        }
    }
}

/// Wires the processor, its runtime and the HTTP surface together.
pub struct SchedulerApiBuilder {
    processor: Arc<ExecutionProcessor>,
    events: BroadcastNotifier,
}

impl SchedulerApiBuilder {
    /// `events` must be the broadcast notifier the processor emits into so
    /// WebSocket clients see lifecycle events.
    pub fn new(processor: Arc<ExecutionProcessor>, events: BroadcastNotifier) -> Self {
        Self { processor, events }
    }

    pub fn router(processor: Arc<ExecutionProcessor>, events: BroadcastNotifier) -> Router {
        let state = SchedulerApiState { processor, events };

        Router::new()
            .route("/health", get(health))
            .route("/executions", get(list_executions).post(enqueue_execution))
            .route("/proposals/:proposal_id/execution", get(get_execution))
            .route("/proposals/:proposal_id/execute", post(execute_proposal))
            .route("/proposals/:proposal_id/cancel", post(cancel_proposal))
            .route("/proposals/:proposal_id/retry", post(retry_proposal))
            .route("/ws/events", get(events_ws_upgrade))
            .with_state(state)
    }

    /// Serves HTTP on `config.bind_address` and starts the scheduler loop.
    ///
    /// The loop only starts once the listener is bound, so a failed start
    /// never leaves a pass running in the background.
    pub async fn serve(self, config: &SchedulerConfig) -> anyhow::Result<RunningService> {
        let listener = tokio::net::TcpListener::bind(&config.bind_address)
            .await
            .with_context(|| format!("failed to bind {}", config.bind_address))?;
        let local_addr = listener.local_addr()?;

        let mut runtime = SchedulerRuntime::new(self.processor.clone());
        runtime.start(config.tick_interval());
        let router = Self::router(self.processor.clone(), self.events.clone());
        let (tx, rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            info!(address = %local_addr, "starting timelock scheduler service");
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
            {
                warn!(error = %err, "http server stopped with error");
            }
            runtime.shutdown().await;
        });

        Ok(RunningService {
            local_addr,
            shutdown: tx,
            task,
        })
    }
}

async fn health(State(state): State<SchedulerApiState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "pass_in_progress": state.processor().pass_in_progress(),
        "max_attempts": state.processor().max_attempts(),
    }))
}

async fn enqueue_execution(
    State(state): State<SchedulerApiState>,
    Json(request): Json<EnqueueExecutionRequest>,
) -> Result<(StatusCode, Json<ExecutionRequest>), ApiError> {
    let stored = state
        .processor()
        .enqueue(&request.proposal_id, request.eta, request.payload)
        .await
        .map_err(map_error)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    proposal_id: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

async fn list_executions(
    State(state): State<SchedulerApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ExecutionRequest>>, ApiError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<ExecutionStatus>)
        .transpose()
        .map_err(|err| map_error(SchedulerError::InvalidRequest(err.to_string())))?;

    let query = ExecutionQuery {
        status,
        proposal_id: params.proposal_id,
        due_before: None,
        limit: params.limit,
    };
    let requests = state.processor().list(&query).await.map_err(map_error)?;
    Ok(Json(requests))
}

async fn get_execution(
    State(state): State<SchedulerApiState>,
    Path(proposal_id): Path<String>,
) -> Result<Json<ExecutionRequest>, ApiError> {
    state
        .processor()
        .get_status(&proposal_id)
        .await
        .map(Json)
        .map_err(map_error)
}

async fn execute_proposal(
    State(state): State<SchedulerApiState>,
    Path(proposal_id): Path<String>,
    Json(body): Json<OperatorActionRequest>,
) -> Result<Json<AttemptOutcome>, ApiError> {
    state
        .processor()
        .manual_execute(&proposal_id, &body.actor)
        .await
        .map(Json)
        .map_err(map_error)
}

async fn cancel_proposal(
    State(state): State<SchedulerApiState>,
    Path(proposal_id): Path<String>,
    Json(body): Json<OperatorActionRequest>,
) -> Result<Json<ExecutionRequest>, ApiError> {
    state
        .processor()
        .cancel(&proposal_id, &body.actor)
        .await
        .map(Json)
        .map_err(map_error)
}

async fn retry_proposal(
    State(state): State<SchedulerApiState>,
    Path(proposal_id): Path<String>,
) -> Result<Json<ExecutionRequest>, ApiError> {
    state
        .processor()
        .retry_reset(&proposal_id)
        .await
        .map(Json)
        .map_err(map_error)
}

async fn events_ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<SchedulerApiState>,
) -> impl IntoResponse {
    let events = state.events.subscribe();
    ws.on_upgrade(|socket| async move {
        if let Err(err) = stream_events(socket, events).await {
            warn!(?err, "event websocket closed with error");
        }
    })
}

async fn stream_events(
    socket: WebSocket,
    mut events: broadcast::Receiver<LifecycleEvent>,
) -> anyhow::Result<()> {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let text = serde_json::to_string(&event)?;
                    sender
                        .send(Message::Text(text))
                        .await
                        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagging; dropped events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = receiver.next() => match message {
                Some(Ok(Message::Ping(payload))) => {
                    sender
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(other)) => debug!(message = ?other, "ignoring client message"),
                Some(Err(err)) => return Err(anyhow::anyhow!(err.to_string())),
            },
        }
    }

    Ok(())
}

fn too_early() -> StatusCode {
    StatusCode::from_u16(425).unwrap_or(StatusCode::CONFLICT)
}

fn map_error(err: SchedulerError) -> ApiError {
    let (status, code) = match &err {
        SchedulerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        SchedulerError::Duplicate { .. } => (StatusCode::CONFLICT, "duplicate"),
        SchedulerError::InvalidState { .. } => (StatusCode::CONFLICT, "invalid_state"),
        SchedulerError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
        SchedulerError::TimelockNotElapsed { .. } => (too_early(), "timelock_not_elapsed"),
        SchedulerError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        SchedulerError::Execution(_) => (StatusCode::BAD_GATEWAY, "execution_failed"),
        SchedulerError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
    };

    (
        status,
        Json(ErrorResponse {
            code: code.into(),
            message: err.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test_case::test_case(SchedulerError::NotFound("p".into()) => 404 ; "not found")]
    #[test_case::test_case(SchedulerError::Duplicate { proposal_id: "p".into() } => 409 ; "duplicate")]
    #[test_case::test_case(SchedulerError::Conflict { id: uuid::Uuid::nil() } => 409 ; "conflict")]
    #[test_case::test_case(SchedulerError::TimelockNotElapsed { proposal_id: "p".into(), eta: Utc::now() } => 425 ; "too early")]
    #[test_case::test_case(SchedulerError::InvalidRequest("x".into()) => 400 ; "invalid")]
    #[test_case::test_case(SchedulerError::Storage("db down".into()) => 500 ; "storage")]
    fn maps_errors_to_status(err: SchedulerError) -> u16 {
        map_error(err).0.as_u16()
    }

    #[test]
    fn error_body_carries_code_and_message() {
        let (_, Json(body)) = map_error(SchedulerError::InvalidState {
            proposal_id: "prop-9".into(),
            status: ExecutionStatus::Executed,
            operation: "cancel",
        });
        assert_eq!(body.code, "invalid_state");
        assert_eq!(body.message, "cannot cancel proposal prop-9 while executed");
    }
}
