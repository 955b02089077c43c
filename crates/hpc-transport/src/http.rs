//! HTTP client for the batch scheduler's REST API.

use crate::token::{Clock, SystemClock, TokenCache};
use hpc_types::{JobRequest, JobTransport, NativeJobState, TransportError};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// e.g. `http://scheduler:9000`
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Token lifetime when the login response does not carry one.
    pub token_ttl: Duration,
    /// Applies to every request, login included.
    pub request_timeout: Duration,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    name: &'a str,
    script: &'a str,
    queue: &'a str,
    resource_request: ResourceBody<'a>,
}

#[derive(Serialize)]
struct ResourceBody<'a> {
    nodes: u32,
    gpus_per_node: u32,
    memory: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Transport that submits and polls jobs over the scheduler's HTTP API.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    tokens: TokenCache,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, reqwest::Error> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: HttpTransportConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let ttl = chrono::Duration::from_std(config.token_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username,
            password: config.password,
            tokens: TokenCache::new(clock, ttl),
        })
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, String> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| format!("invalid scheduler url {}: {}", self.base_url, e))?;
        url.path_segments_mut()
            .map_err(|_| format!("scheduler url {} cannot be a base", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn login(&self) -> Result<(String, Option<i64>), TransportError> {
        let url = self
            .endpoint(&["api", "auth", "login"])
            .map_err(TransportError::Authentication)?;
        let res = self
            .client
            .post(url)
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|e| TransportError::Authentication(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "scheduler login rejected");
            return Err(TransportError::Authentication(format!(
                "login rejected {}: {}",
                status, body
            )));
        }
        let parsed: LoginResponse = res
            .json()
            .await
            .map_err(|e| TransportError::Authentication(format!("bad login response: {}", e)))?;
        tracing::info!(user = %self.username, "authenticated against scheduler");
        Ok((parsed.token, parsed.expires_in))
    }

    async fn token(&self) -> Result<String, TransportError> {
        self.tokens.get_or_refresh(move || self.login()).await
    }

    /// A 401 means the cached token went stale server-side; drop it so the next call
    /// logs in again. The current call still fails.
    async fn reject_if_unauthorized(&self, status: StatusCode) -> Result<(), TransportError> {
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
            return Err(TransportError::Authentication(
                "scheduler rejected bearer token".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn submit(&self, job: &JobRequest) -> Result<String, TransportError> {
        let token = self.token().await?;
        let url = self
            .endpoint(&["api", "jobs"])
            .map_err(TransportError::Submission)?;
        let body = SubmitRequest {
            name: &job.name,
            script: &job.script,
            queue: &job.queue,
            resource_request: ResourceBody {
                nodes: job.resources.nodes,
                gpus_per_node: job.resources.gpus_per_node,
                memory: &job.resources.memory,
            },
        };
        let res = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Submission(e.to_string()))?;
        let status = res.status();
        self.reject_if_unauthorized(status).await?;
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            tracing::error!(task_id = %job.task_id, status = %status, body = %text, "job submission rejected");
            return Err(TransportError::Submission(format!(
                "scheduler error {}: {}",
                status, text
            )));
        }
        let parsed: SubmitResponse = res
            .json()
            .await
            .map_err(|e| TransportError::Submission(format!("bad submit response: {}", e)))?;
        let job_id = match parsed.job_id {
            serde_json::Value::String(s) if !s.trim().is_empty() => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(TransportError::Submission(format!(
                    "scheduler returned unusable job id {}",
                    other
                )))
            }
        };
        tracing::info!(task_id = %job.task_id, job_id = %job_id, "job submitted over http");
        Ok(job_id)
    }

    async fn query(&self, job_id: &str) -> Result<Option<NativeJobState>, TransportError> {
        let token = self.token().await?;
        let url = self
            .endpoint(&["api", "jobs", job_id])
            .map_err(TransportError::StatusQuery)?;
        let res = self
            .client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| TransportError::StatusQuery(e.to_string()))?;
        let status = res.status();
        self.reject_if_unauthorized(status).await?;
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            tracing::warn!(job_id = %job_id, status = %status, body = %text, "job status query failed");
            return Err(TransportError::StatusQuery(format!(
                "scheduler error {}: {}",
                status, text
            )));
        }
        let parsed: StatusResponse = res
            .json()
            .await
            .map_err(|e| TransportError::StatusQuery(format!("bad status response: {}", e)))?;
        Ok(Some(NativeJobState {
            status: parsed.status.unwrap_or_else(|| "UNKNOWN".to_string()),
            error: parsed.error,
        }))
    }
}
