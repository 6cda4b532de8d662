mod batch;
mod job;
mod stats;

pub use batch::{Batch, DEFAULT_ASPECT_RATIO, DEFAULT_MODEL, VideoSettings};
pub use job::{Job, JobStatus, JobUpdate, Transition};
pub use stats::{BatchStats, format_duration};
