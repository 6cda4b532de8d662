//! Error type for the KIE.AI client.
//!
//! [`ApiError`] separates failures the caller treats differently: rate
//! limiting is retried by the submitter, timeouts and network errors are
//! transient for the poller, everything else is reported as-is.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 401 or an envelope with code 401.
    #[error("invalid API key")]
    Unauthorized,

    /// HTTP 429 or an envelope with code 429.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Any other non-2xx HTTP status.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// HTTP 200 whose envelope `code` is not 200.
    #[error("API rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// The generate response carried no `taskId`.
    #[error("response did not contain a taskId")]
    MissingTaskId,

    /// The body parsed but lacked the expected `data` payload.
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(reqwest::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(err)
        }
    }
}
