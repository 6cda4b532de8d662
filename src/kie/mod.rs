pub mod client;
pub mod error;
pub mod types;

pub use client::{KieClient, VideoApi};
pub use error::ApiError;
pub use types::{GenerateRequest, TaskState};
