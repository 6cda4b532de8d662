//! veobatch configuration loaded from `veobatch.toml`.
//!
//! Every field has a default, so the file is optional. `API_KEY` and
//! `MAX_CONCURRENT_REQUESTS` from the environment (or a `.env` file loaded in
//! `main`) take precedence over the file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::VeoError;
use crate::kie::client::API_BASE_URL;
use crate::poller::DEFAULT_POLL_INTERVAL;
use crate::session::DEFAULT_SESSION_FILE;
use crate::submitter::RetryConfig;
use crate::tracking::{DEFAULT_ASPECT_RATIO, DEFAULT_MODEL, VideoSettings};

pub const CONFIG_FILE: &str = "veobatch.toml";
pub const MAX_CONCURRENCY: usize = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct VeoConfig {
    /// Bearer token for the video API.
    #[serde(default)]
    pub api_key: String,

    /// API root; overridden in tests to point at a local server.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Ceiling on simultaneous outbound calls, 1 to 20.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Seconds between status rounds (at least 1).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Retries after HTTP 429 on task creation.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds for the 429 backoff.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Model sent with every creation call.
    #[serde(default = "default_model")]
    pub model: String,

    /// Default aspect ratio; `generate --aspect-ratio` overrides it.
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,

    /// Snapshot path used when `--session` is not given.
    #[serde(default = "default_session_file")]
    pub session_file: String,
}

// Production KIE.AI endpoint
fn default_base_url() -> String {
    API_BASE_URL.to_string()
}

// Highest allowed ceiling
fn default_max_concurrent_requests() -> usize {
    MAX_CONCURRENCY
}

// 5 seconds
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

// Three retries after the first 429
fn default_max_retries() -> u32 {
    3
}

// 2s, doubling per attempt
fn default_base_delay_ms() -> u64 {
    2000
}

// veo3_fast
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

// 16:9 landscape
fn default_aspect_ratio() -> String {
    DEFAULT_ASPECT_RATIO.to_string()
}

// veobatch-session.json in the working directory
fn default_session_file() -> String {
    DEFAULT_SESSION_FILE.to_string()
}

impl Default for VeoConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            max_concurrent_requests: default_max_concurrent_requests(),
            poll_interval_secs: default_poll_interval_secs(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            model: default_model(),
            aspect_ratio: default_aspect_ratio(),
            session_file: default_session_file(),
        }
    }
}

impl VeoConfig {
    /// Load `veobatch.toml` from the current directory, then apply the
    /// environment.
    pub fn load() -> Result<Self, VeoError> {
        let mut config = Self::load_from(Path::new(CONFIG_FILE))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config file, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, VeoError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<VeoConfig>(&contents)?)
    }

    /// Override fields from environment variables looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), VeoError> {
        if let Some(key) = var("API_KEY")
            && !key.trim().is_empty()
        {
            self.api_key = key.trim().to_string();
        }

        if let Some(raw) = var("MAX_CONCURRENT_REQUESTS")
            && !raw.trim().is_empty()
        {
            self.max_concurrent_requests = raw.trim().parse().map_err(|_| {
                VeoError::Config(format!("MAX_CONCURRENT_REQUESTS must be an integer, got `{raw}`"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), VeoError> {
        check_concurrency(self.max_concurrent_requests)?;
        if self.poll_interval_secs == 0 {
            return Err(VeoError::Config("poll_interval_secs must be at least 1".into()));
        }
        if self.model.trim().is_empty() || self.aspect_ratio.trim().is_empty() {
            return Err(VeoError::Config("model and aspect_ratio must not be empty".into()));
        }
        Ok(())
    }

    /// The API key, or an error telling the user how to set it.
    pub fn require_api_key(&self) -> Result<&str, VeoError> {
        if self.api_key.is_empty() {
            return Err(VeoError::Config(format!(
                "API key missing. Set API_KEY or `api_key` in {CONFIG_FILE}."
            )));
        }
        Ok(&self.api_key)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
        }
    }

    pub fn video_settings(&self) -> VideoSettings {
        VideoSettings {
            model: self.model.clone(),
            aspect_ratio: self.aspect_ratio.clone(),
        }
    }
}

/// Concurrency must be within 1..=20.
pub fn check_concurrency(value: usize) -> Result<usize, VeoError> {
    if (1..=MAX_CONCURRENCY).contains(&value) {
        Ok(value)
    } else {
        Err(VeoError::Config(format!(
            "concurrency must be between 1 and {MAX_CONCURRENCY}, got {value}"
        )))
    }
}
