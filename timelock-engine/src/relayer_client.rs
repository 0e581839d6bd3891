use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use timelock_protocol::execution::ExecutionReceipt;
use tracing::debug;
use url::Url;

use crate::executor::{ExecutionCall, ExecutionError, ExecutorAdapter};

/// Executor adapter that hands each attempt to an HTTP transaction relayer.
///
/// The relayer receives the serialized [`ExecutionCall`] on
/// `POST {base}/executions` and answers with `{ tx_hash, block_number?, metadata? }`.
#[derive(Clone)]
pub struct RelayerExecutor {
    http: reqwest::Client,
    endpoint: Url,
}

impl RelayerExecutor {
    /// Creates a client bound to the relayer base URL. `timeout` bounds every
    /// attempt end to end.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RelayerClientError> {
        let mut url = Url::parse(base_url).map_err(|err| RelayerClientError::InvalidUrl {
            url: base_url.to_string(),
            source: err,
        })?;

        if !url.path().ends_with('/') {
            let mut path = url.path().trim_end_matches('/').to_string();
            path.push('/');
            url.set_path(&path);
        }

        let endpoint = url
            .join("executions")
            .map_err(|err| RelayerClientError::InvalidUrl {
                url: format!("{}executions", url),
                source: err,
            })?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RelayerClientError::Client(err.to_string()))?;

        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ExecutorAdapter for RelayerExecutor {
    async fn execute(&self, call: &ExecutionCall) -> Result<ExecutionReceipt, ExecutionError> {
        debug!(
            request_id = %call.request_id,
            attempt = call.attempt,
            endpoint = %self.endpoint,
            "submitting execution to relayer"
        );

        let response = self
            .http
            .post(self.endpoint.clone())
            .header("Idempotency-Key", &call.idempotency_key)
            .json(call)
            .send()
            .await
            .map_err(|err| ExecutionError::transient(format!("relayer request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("relayer returned {status}: {body}");
            return Err(if is_retryable_status(status) {
                ExecutionError::transient(message)
            } else {
                ExecutionError::permanent(message)
            });
        }

        // A success status with an unreadable body may still mean the
        // transaction was broadcast, so it is never retried.
        response.json::<ExecutionReceipt>().await.map_err(|err| {
            ExecutionError::permanent(format!("failed to decode relayer receipt: {err}"))
        })
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

#[derive(Debug, Error)]
pub enum RelayerClientError {
    #[error("invalid relayer url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to build relayer client: {0}")]
    Client(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FailureKind;
    use timelock_protocol::execution::PayloadCall;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_call() -> ExecutionCall {
        let request_id = Uuid::new_v4();
        ExecutionCall {
            request_id,
            proposal_id: "prop-42".into(),
            attempt: 1,
            idempotency_key: format!("{request_id}:1"),
            calls: vec![PayloadCall::new("0xtreasury", "1000", "0xa9059cbb")],
        }
    }

    fn executor(server: &MockServer, timeout: Duration) -> RelayerExecutor {
        RelayerExecutor::new(&format!("{}/relay", server.uri()), timeout).expect("client")
    }

    #[tokio::test]
    async fn returns_receipt_on_success() {
        let server = MockServer::start().await;
        let call = sample_call();
        Mock::given(method("POST"))
            .and(path("/relay/executions"))
            .and(header("Idempotency-Key", call.idempotency_key.as_str()))
            .and(body_partial_json(serde_json::json!({ "proposal_id": "prop-42" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "tx_hash": "0xabc", "block_number": 7 })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipt = executor(&server, Duration::from_secs(5))
            .execute(&call)
            .await
            .expect("receipt");
        assert_eq!(receipt.tx_hash, "0xabc");
        assert_eq!(receipt.block_number, Some(7));
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("node syncing"))
            .mount(&server)
            .await;

        let err = executor(&server, Duration::from_secs(5))
            .execute(&sample_call())
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Transient);
        assert!(err.message.contains("node syncing"));
    }

    #[tokio::test]
    async fn client_errors_are_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("execution reverted"))
            .mount(&server)
            .await;

        let err = executor(&server, Duration::from_secs(5))
            .execute(&sample_call())
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Permanent);
    }

    #[tokio::test]
    async fn slow_relayer_times_out_as_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "tx_hash": "0xlate" }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = executor(&server, Duration::from_millis(50))
            .execute(&sample_call())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn rejects_invalid_base_url() {
        let result = RelayerExecutor::new("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(RelayerClientError::InvalidUrl { .. })));
    }
}
