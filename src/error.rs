use std::path::PathBuf;

use thiserror::Error;

use crate::kie::ApiError;

#[derive(Debug, Error)]
pub enum VeoError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("No prompts given. Separate prompts with a blank line.")]
    NoPrompts,

    #[error("Prompt #{0} is empty")]
    EmptyPrompt(usize),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job id prefix `{0}` matches more than one job")]
    AmbiguousJobId(String),

    #[error("No session at {0}. Run `veobatch generate` first.")]
    SessionNotFound(PathBuf),

    #[error("Unsupported session snapshot version {0}")]
    UnsupportedSnapshot(u32),

    #[error("Video API error: {0}")]
    Api(#[from] ApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
