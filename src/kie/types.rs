//! Wire types for the KIE.AI Veo3 endpoints.
//!
//! Every response is wrapped in an [`Envelope`] carrying an application-level
//! `code` next to the HTTP status. Field names follow the API's camelCase.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/veo/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Text prompt describing the video.
    pub prompt: String,
    /// Output aspect ratio, e.g. "16:9".
    pub aspect_ratio: String,
    /// Model identifier, e.g. "veo3_fast".
    pub model: String,
    /// Optional webhook the API calls when the task finishes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_back_url: Option<String>,
}

/// Common response wrapper: `{code, msg, data}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

/// `data` payload of a successful generate call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateData {
    pub task_id: Option<String>,
}

/// `data` payload of `GET /api/v1/veo/record-info`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordInfo {
    /// 0 = generating, 1 = success, 2 = failed, 3 = generation failed.
    #[serde(default)]
    pub success_flag: Option<i64>,
    #[serde(default)]
    pub response: Option<ResultPayload>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    #[serde(default)]
    pub result_urls: Vec<String>,
}

/// Task state as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Still generating (or a flag this client does not recognise).
    Generating,
    /// Finished; the first result URL if the API returned one.
    Succeeded { video_url: Option<String> },
    /// The API reported a failure.
    Failed { message: String },
}

impl RecordInfo {
    pub fn state(&self) -> TaskState {
        match self.success_flag.unwrap_or(0) {
            1 => TaskState::Succeeded {
                video_url: self
                    .response
                    .as_ref()
                    .and_then(|r| r.result_urls.first().cloned()),
            },
            2 | 3 => TaskState::Failed {
                message: self
                    .error_message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string()),
            },
            _ => TaskState::Generating,
        }
    }
}
