use std::io;

use reqwest::Url;
use serde::de::DeserializeOwned;
use timelock_protocol::api::{EnqueueExecutionRequest, ErrorResponse, OperatorActionRequest};
use timelock_protocol::execution::{AttemptOutcome, ExecutionRequest, ExecutionStatus};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("scheduler rejected the request ({status}): {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },
    #[error("could not read input: {0}")]
    Input(String),
    #[error("{0}")]
    Validation(String),
}

impl From<reqwest::Error> for CliError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.to_string())
    }
}

impl From<io::Error> for CliError {
    fn from(value: io::Error) -> Self {
        Self::Input(value.to_string())
    }
}

impl From<timelock_core::CoreError> for CliError {
    fn from(value: timelock_core::CoreError) -> Self {
        Self::Input(value.to_string())
    }
}

/// Thin client over the scheduler HTTP service.
pub struct SchedulerClient {
    base_url: Url,
    http: reqwest::Client,
}

impl SchedulerClient {
    pub fn new(base_url: &str) -> Result<Self, CliError> {
        let url = Url::parse(base_url)
            .map_err(|err| CliError::Validation(format!("invalid service URL: {err}")))?;
        if url.cannot_be_a_base() {
            return Err(CliError::Validation(format!(
                "invalid service URL: {base_url}"
            )));
        }
        Ok(Self {
            base_url: url,
            http: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, CliError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CliError::Validation("service URL cannot take a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn health(&self) -> Result<serde_json::Value, CliError> {
        let url = self.endpoint(&["health"])?;
        let response = self.http.get(url).send().await?;
        parse_response(response).await
    }

    pub async fn enqueue(
        &self,
        request: &EnqueueExecutionRequest,
    ) -> Result<ExecutionRequest, CliError> {
        let url = self.endpoint(&["executions"])?;
        debug!(%url, proposal_id = %request.proposal_id, "enqueue");
        let response = self.http.post(url).json(request).send().await?;
        parse_response(response).await
    }

    pub async fn status(&self, proposal_id: &str) -> Result<ExecutionRequest, CliError> {
        let url = self.endpoint(&["proposals", proposal_id, "execution"])?;
        let response = self.http.get(url).send().await?;
        parse_response(response).await
    }

    pub async fn list(
        &self,
        status: Option<ExecutionStatus>,
    ) -> Result<Vec<ExecutionRequest>, CliError> {
        let mut url = self.endpoint(&["executions"])?;
        if let Some(status) = status {
            url.query_pairs_mut().append_pair("status", status.as_str());
        }
        let response = self.http.get(url).send().await?;
        parse_response(response).await
    }

    pub async fn execute(&self, proposal_id: &str, actor: &str) -> Result<AttemptOutcome, CliError> {
        let url = self.endpoint(&["proposals", proposal_id, "execute"])?;
        let body = OperatorActionRequest {
            actor: actor.to_string(),
        };
        let response = self.http.post(url).json(&body).send().await?;
        parse_response(response).await
    }

    pub async fn cancel(&self, proposal_id: &str, actor: &str) -> Result<ExecutionRequest, CliError> {
        let url = self.endpoint(&["proposals", proposal_id, "cancel"])?;
        let body = OperatorActionRequest {
            actor: actor.to_string(),
        };
        let response = self.http.post(url).json(&body).send().await?;
        parse_response(response).await
    }

    pub async fn retry(&self, proposal_id: &str) -> Result<ExecutionRequest, CliError> {
        let url = self.endpoint(&["proposals", proposal_id, "retry"])?;
        let response = self.http.post(url).send().await?;
        parse_response(response).await
    }
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CliError> {
    if response.status().is_success() {
        response
            .json::<T>()
            .await
            .map_err(|err| CliError::Http(err.to_string()))
    } else {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => Err(CliError::Service {
                status,
                code: err.code,
                message: err.message,
            }),
            Err(_) => Err(CliError::Service {
                status,
                code: "unknown".into(),
                message: body,
            }),
        }
    }
}
