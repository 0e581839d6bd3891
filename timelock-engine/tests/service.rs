// Drives the scheduler HTTP service end to end over an ephemeral port.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use serde_json::{json, Value};
use timelock_engine::{
    BroadcastNotifier, ExecutionCall, ExecutionError, ExecutionProcessor, ExecutorAdapter,
    InMemoryLedger, RunningService, SchedulerApiBuilder, SchedulerConfig,
};
use timelock_protocol::execution::{ExecutionReceipt, LifecycleEvent, LifecycleEventKind};

/// Succeeds unless the proposal id starts with `fail-`.
#[derive(Default)]
struct ScriptedExecutor {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl ExecutorAdapter for ScriptedExecutor {
    async fn execute(&self, call: &ExecutionCall) -> Result<ExecutionReceipt, ExecutionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if call.proposal_id.starts_with("fail-") {
            Err(ExecutionError::transient("relayer timeout"))
        } else {
            Ok(ExecutionReceipt::new(format!("0x{n:04x}")).with_block(100 + n as u64))
        }
    }
}

async fn start() -> (RunningService, String) {
    let events = BroadcastNotifier::new(64);
    let processor = ExecutionProcessor::builder(
        Arc::new(InMemoryLedger::new()),
        Arc::new(ScriptedExecutor::default()),
    )
    .notifier(Arc::new(events.clone()))
    .build();

    let config = SchedulerConfig {
        bind_address: "127.0.0.1:0".into(),
        tick_interval_secs: 3600,
        ..SchedulerConfig::default()
    };

    let service = SchedulerApiBuilder::new(Arc::new(processor), events)
        .serve(&config)
        .await
        .expect("service started");
    let base = format!("http://{}", service.local_addr);
    (service, base)
}

async fn enqueue(client: &reqwest::Client, base: &str, proposal: &str, offset_secs: i64) -> reqwest::Response {
    client
        .post(format!("{base}/executions"))
        .json(&json!({
            "proposal_id": proposal,
            "eta": Utc::now() + chrono::Duration::seconds(offset_secs),
            "payload": [{ "target": "0xgovernor", "value": "0", "call_data": "0xfe0d94c1" }],
        }))
        .send()
        .await
        .expect("enqueue request")
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (service, base) = start().await;

    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .expect("health request")
        .json()
        .await
        .expect("json body");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["max_attempts"], 3);

    service.stop().await;
}

#[tokio::test]
async fn operator_flow_over_http() {
    let (service, base) = start().await;
    let client = reqwest::Client::new();

    let created = enqueue(&client, &base, "prop-http", -1).await;
    assert_eq!(created.status(), 201);
    let duplicate = enqueue(&client, &base, "prop-http", -1).await;
    assert_eq!(duplicate.status(), 409);
    let error: Value = duplicate.json().await.expect("error body");
    assert_eq!(error["code"], "duplicate");

    let outcome: Value = client
        .post(format!("{base}/proposals/prop-http/execute"))
        .json(&json!({ "actor": "guardian" }))
        .send()
        .await
        .expect("execute request")
        .json()
        .await
        .expect("outcome body");
    assert_eq!(outcome["outcome"], "executed");
    assert_eq!(outcome["request"]["status"], "executed");
    assert_eq!(outcome["request"]["attempts"], 1);

    let cancel = client
        .post(format!("{base}/proposals/prop-http/cancel"))
        .json(&json!({ "actor": "guardian" }))
        .send()
        .await
        .expect("cancel request");
    assert_eq!(cancel.status(), 409);

    let executed: Vec<Value> = client
        .get(format!("{base}/executions?status=executed"))
        .send()
        .await
        .expect("list request")
        .json()
        .await
        .expect("list body");
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0]["proposal_id"], "prop-http");

    service.stop().await;
}

#[tokio::test]
async fn early_execute_and_unknown_proposals_are_rejected() {
    let (service, base) = start().await;
    let client = reqwest::Client::new();

    enqueue(&client, &base, "prop-future", 3600).await;
    let early = client
        .post(format!("{base}/proposals/prop-future/execute"))
        .json(&json!({ "actor": "ops" }))
        .send()
        .await
        .expect("execute request");
    assert_eq!(early.status().as_u16(), 425);

    let status: Value = client
        .get(format!("{base}/proposals/prop-future/execution"))
        .send()
        .await
        .expect("status request")
        .json()
        .await
        .expect("status body");
    assert_eq!(status["status"], "queued");
    assert_eq!(status["attempts"], 0);

    let missing = client
        .get(format!("{base}/proposals/nope/execution"))
        .send()
        .await
        .expect("status request");
    assert_eq!(missing.status(), 404);

    let bad_filter = client
        .get(format!("{base}/executions?status=pending"))
        .send()
        .await
        .expect("list request");
    assert_eq!(bad_filter.status(), 400);

    let empty = client
        .post(format!("{base}/executions"))
        .json(&json!({ "proposal_id": "prop-empty", "eta": Utc::now(), "payload": [] }))
        .send()
        .await
        .expect("enqueue request");
    assert_eq!(empty.status(), 400);

    service.stop().await;
}

#[tokio::test]
async fn cancel_then_retry_reset_is_rejected() {
    let (service, base) = start().await;
    let client = reqwest::Client::new();

    enqueue(&client, &base, "fail-cancel", 3600).await;
    let cancelled: Value = client
        .post(format!("{base}/proposals/fail-cancel/cancel"))
        .json(&json!({ "actor": "multisig" }))
        .send()
        .await
        .expect("cancel request")
        .json()
        .await
        .expect("cancel body");
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["cancelled_by"], "multisig");

    let reset = client
        .post(format!("{base}/proposals/fail-cancel/retry"))
        .send()
        .await
        .expect("retry request");
    assert_eq!(reset.status(), 409);

    service.stop().await;
}

#[tokio::test]
async fn websocket_streams_lifecycle_events() {
    let (service, base) = start().await;
    let ws_url = format!("ws://{}/ws/events", service.local_addr);
    let (mut socket, _) = tokio_tungstenite::connect_async(ws_url)
        .await
        .expect("websocket connects");

    let client = reqwest::Client::new();
    enqueue(&client, &base, "prop-ws", -1).await;

    let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .expect("event before timeout")
        .expect("stream open")
        .expect("valid frame");
    let event: LifecycleEvent =
        serde_json::from_str(message.to_text().expect("text frame")).expect("event json");
    assert_eq!(event.kind, LifecycleEventKind::Queued);
    assert_eq!(event.proposal_id, "prop-ws");
    assert_eq!(event.name(), "execution.queued");

    drop(socket);
    service.stop().await;
}

#[tokio::test]
async fn failed_bind_does_not_start_the_scheduler() {
    let occupied = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("reserve port");
    let address = occupied.local_addr().expect("reserved address");

    let executor = Arc::new(ScriptedExecutor::default());
    let processor = Arc::new(
        ExecutionProcessor::builder(Arc::new(InMemoryLedger::new()), executor.clone()).build(),
    );
    processor
        .enqueue(
            "prop-bind",
            Utc::now() - chrono::Duration::seconds(5),
            vec![timelock_protocol::execution::PayloadCall::new("0xgovernor", "0", "0x")],
        )
        .await
        .expect("enqueue");

    let config = SchedulerConfig {
        bind_address: address.to_string(),
        tick_interval_secs: 1,
        ..SchedulerConfig::default()
    };
    let result = SchedulerApiBuilder::new(processor.clone(), BroadcastNotifier::new(8))
        .serve(&config)
        .await;
    assert!(result.is_err());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let request = processor.get_status("prop-bind").await.expect("status");
    assert_eq!(
        request.status,
        timelock_protocol::execution::ExecutionStatus::Queued
    );
    assert_eq!(request.attempts, 0);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    drop(occupied);
}
