use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::error::ApiError;
use super::types::{Envelope, GenerateData, GenerateRequest, RecordInfo, TaskState};

pub const API_BASE_URL: &str = "https://api.kie.ai";
const GENERATE_PATH: &str = "/api/v1/veo/generate";
const RECORD_INFO_PATH: &str = "/api/v1/veo/record-info";

/// Fallback wait when a 429 carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_MS: u64 = 2000;

/// Longest server-requested wait honoured before retrying.
const MAX_RETRY_AFTER_MS: u64 = 60_000;

/// The two calls the job tracker needs from the video API.
///
/// Implemented by [`KieClient`] for real traffic and by mocks in tests.
pub trait VideoApi: Send + Sync {
    /// Create a generation task and return its external identifier.
    fn create_task(
        &self,
        req: &GenerateRequest,
    ) -> impl Future<Output = Result<String, ApiError>> + Send;

    /// Query the current state of a previously created task.
    fn task_state(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<TaskState, ApiError>> + Send;
}

pub struct KieClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl KieClient {
    /// Create a client for `base_url` (normally [`API_BASE_URL`]).
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            api_key,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Map HTTP-level failures, then decode the JSON envelope.
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<Envelope<T>, ApiError> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000).min(MAX_RETRY_AFTER_MS))
                .unwrap_or(DEFAULT_RETRY_AFTER_MS);
            return Err(ApiError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ApiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope = response.json::<Envelope<T>>().await?;
        match envelope.code {
            200 => Ok(envelope),
            401 => Err(ApiError::Unauthorized),
            429 => Err(ApiError::RateLimited {
                retry_after_ms: DEFAULT_RETRY_AFTER_MS,
            }),
            code => Err(ApiError::Rejected {
                code,
                message: envelope.msg,
            }),
        }
    }
}

impl VideoApi for KieClient {
    async fn create_task(&self, req: &GenerateRequest) -> Result<String, ApiError> {
        let response = self
            .client
            .post(format!("{}{GENERATE_PATH}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await?;

        let envelope = Self::decode::<GenerateData>(response).await?;
        envelope
            .data
            .and_then(|d| d.task_id)
            .filter(|id| !id.is_empty())
            .ok_or(ApiError::MissingTaskId)
    }

    async fn task_state(&self, task_id: &str) -> Result<TaskState, ApiError> {
        let response = self
            .client
            .get(format!("{}{RECORD_INFO_PATH}", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("taskId", task_id)])
            .send()
            .await?;

        let envelope = Self::decode::<RecordInfo>(response).await?;
        let info = envelope
            .data
            .ok_or_else(|| ApiError::Malformed(format!("no data for task {task_id}")))?;
        Ok(info.state())
    }
}
