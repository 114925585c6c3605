use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;
use uuid::Uuid;

use crate::{
    Dataset, DatasetStore, Example, Feedback, FeedbackStore, LangSmithConfig, NewExample,
    RunEvent, TelemetrySink, DEFAULT_REQUEST_TIMEOUT,
};

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum LangSmithError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http error: {status}")]
    Http { status: StatusCode, body: String },
}

#[derive(Clone)]
pub struct LangSmithClient {
    client: Client,
    api_url: String,
    api_key: SecretString,
}

impl LangSmithClient {
    pub fn new(api_url: String, api_key: SecretString) -> Self {
        Self::with_timeout(api_url, api_key, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn from_config(config: &LangSmithConfig) -> Self {
        Self::with_timeout(
            config.api_url.clone(),
            config.api_key.clone(),
            config.request_timeout,
        )
    }

    /// Every HTTP attempt is abandoned after `request_timeout`.
    pub fn with_timeout(api_url: String, api_key: SecretString, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "falling back to default langsmith http client");
                Client::new()
            });
        Self {
            client,
            api_url,
            api_key,
        }
    }

    pub async fn create_run(&self, run_id: Uuid, payload: &Value) -> Result<(), LangSmithError> {
        let url = self.url("runs");
        self.send_with_retry(Method::POST, &url, Some(run_id.to_string()), Some(payload), false)
            .await
            .map(drop)
    }

    pub async fn update_run(&self, run_id: Uuid, payload: &Value) -> Result<(), LangSmithError> {
        let url = self.url(&format!("runs/{run_id}"));
        self.send_with_retry(Method::PATCH, &url, None, Some(payload), true)
            .await
            .map(drop)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), path)
    }

    async fn send_with_retry(
        &self,
        method: Method,
        url: &str,
        idempotency_key: Option<String>,
        payload: Option<&Value>,
        allow_not_found: bool,
    ) -> Result<Response, LangSmithError> {
        let mut attempt = 0;
        let mut backoff = Duration::from_millis(200);

        loop {
            attempt += 1;
            let mut request = self
                .client
                .request(method.clone(), url)
                .header("x-api-key", self.api_key.expose_secret());
            if let Some(payload) = payload {
                request = request.json(payload);
            }
            if let Some(key) = &idempotency_key {
                request = request.header("x-idempotency-key", key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if allow_not_found && status == StatusCode::NOT_FOUND {
                        return Ok(response);
                    }
                    if should_retry(status) && attempt < MAX_ATTEMPTS {
                        backoff = next_delay(status, response.headers(), backoff);
                        tracing::debug!(%status, attempt, ?backoff, url, "retrying langsmith request");
                        sleep(backoff).await;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(LangSmithError::Http { status, body });
                }
                Err(err) => {
                    if (err.is_timeout() || err.is_connect()) && attempt < MAX_ATTEMPTS {
                        sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                        continue;
                    }
                    return Err(LangSmithError::Request(err));
                }
            }
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn next_delay(status: StatusCode, headers: &HeaderMap, backoff: Duration) -> Duration {
    if status == StatusCode::TOO_MANY_REQUESTS {
        if let Some(value) = headers.get("Retry-After").and_then(|v| v.to_str().ok()) {
            if let Ok(seconds) = value.parse::<u64>() {
                return Duration::from_secs(seconds);
            }
        }
    }
    backoff.saturating_mul(2)
}

#[async_trait]
impl TelemetrySink for LangSmithClient {
    async fn submit(&self, event: &RunEvent) -> Result<(), LangSmithError> {
        let payload = event.to_payload();
        match event {
            RunEvent::Start { run_id, .. } => self.create_run(*run_id, &payload).await,
            RunEvent::Update { run_id, .. } => self.update_run(*run_id, &payload).await,
        }
    }
}

#[async_trait]
impl DatasetStore for LangSmithClient {
    async fn create_dataset(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Dataset, LangSmithError> {
        let url = self.url("datasets");
        let payload = json!({"name": name, "description": description});
        let response = self
            .send_with_retry(Method::POST, &url, None, Some(&payload), false)
            .await?;
        Ok(response.json().await?)
    }

    async fn create_examples(
        &self,
        dataset_id: Uuid,
        examples: &[NewExample],
    ) -> Result<Vec<Example>, LangSmithError> {
        if examples.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url("examples/bulk");
        let payload = Value::Array(
            examples
                .iter()
                .map(|example| {
                    json!({
                        "dataset_id": dataset_id,
                        "inputs": example.inputs,
                        "outputs": example.outputs,
                    })
                })
                .collect(),
        );
        let response = self
            .send_with_retry(Method::POST, &url, None, Some(&payload), false)
            .await?;
        Ok(response.json().await?)
    }

    async fn list_examples(&self, dataset_id: Uuid) -> Result<Vec<Example>, LangSmithError> {
        let url = self.url(&format!("examples?dataset={dataset_id}"));
        let response = self
            .send_with_retry(Method::GET, &url, None, None, false)
            .await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl FeedbackStore for LangSmithClient {
    async fn create_feedback(&self, run_id: Uuid, feedback: &Feedback) -> Result<(), LangSmithError> {
        let url = self.url("feedback");
        let feedback_id = Uuid::new_v4();
        let payload = json!({
            "id": feedback_id,
            "run_id": run_id,
            "key": feedback.key,
            "score": feedback.score,
            "value": feedback.value,
            "comment": feedback.comment,
        });
        self.send_with_retry(
            Method::POST,
            &url,
            Some(feedback_id.to_string()),
            Some(&payload),
            false,
        )
        .await
        .map(drop)
    }
}
