//! Status polling for submitted jobs.
//!
//! Every round queries each non-terminal job once (concurrently, bounded by
//! the same ceiling as submission), then applies the answers to the batch.
//! Query failures are transient: the job keeps its status and is asked again
//! next round. Only an explicit failure from the API fails a job.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::kie::{TaskState, VideoApi};
use crate::tracking::{Batch, Job, JobUpdate, Transition};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

impl From<TaskState> for JobUpdate {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Generating => JobUpdate::Generating,
            TaskState::Succeeded { video_url } => JobUpdate::Succeeded {
                result_url: video_url,
            },
            TaskState::Failed { message } => JobUpdate::Failed { message },
        }
    }
}

/// Outcome of one polling round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub queried: usize,
    pub transitions: usize,
    pub transient_errors: usize,
}

/// Why [`Poller::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// No job is waiting on the API any more.
    Finished,
    /// The cancellation token fired.
    Cancelled,
}

pub struct Poller<A> {
    api: Arc<A>,
    interval: Duration,
    concurrency: usize,
}

impl<A: VideoApi + 'static> Poller<A> {
    pub fn new(api: Arc<A>, interval: Duration, concurrency: usize) -> Self {
        Self {
            api,
            interval,
            concurrency: concurrency.max(1),
        }
    }

    /// Query every pending job once and apply the results.
    pub async fn poll_once(&self, batch: &mut Batch) -> PollReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::new();

        for (index, task_id) in batch.pending_poll() {
            let api = Arc::clone(&self.api);
            let semaphore = Arc::clone(&semaphore);
            // Dropping the handle detaches the task; a cancelled round lets
            // in-flight queries finish and discards them.
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = api.task_state(&task_id).await;
                (task_id, result)
            });
            handles.push((index, handle));
        }

        let mut report = PollReport {
            queried: handles.len(),
            ..Default::default()
        };

        for (index, handle) in handles {
            let job_id = batch.jobs()[index].id().to_string();
            match handle.await {
                Ok((task_id, Ok(state))) => {
                    let transition = batch.apply(index, state.into(), Utc::now());
                    if transition.changed_status() {
                        report.transitions += 1;
                        log_transition(&batch.jobs()[index], &task_id, transition);
                    }
                }
                Ok((task_id, Err(e))) => {
                    report.transient_errors += 1;
                    tracing::warn!(
                        job_id = %job_id,
                        task_id = %task_id,
                        error = %e,
                        "Status query failed, retrying next interval",
                    );
                }
                Err(e) => {
                    report.transient_errors += 1;
                    tracing::warn!(job_id = %job_id, error = %e, "Status query task aborted");
                }
            }
        }

        report
    }

    /// Poll until no job is pending or `cancel` fires.
    ///
    /// `observer` sees the batch after every round. Jobs that were never
    /// submitted are not polled, so submit the batch first.
    pub async fn run<F>(&self, batch: &mut Batch, cancel: &CancellationToken, mut observer: F) -> PollExit
    where
        F: FnMut(&Batch, &PollReport),
    {
        loop {
            if !batch.has_pending_poll() {
                return PollExit::Finished;
            }

            let report = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollExit::Cancelled,
                report = self.poll_once(batch) => report,
            };
            tracing::debug!(
                queried = report.queried,
                transitions = report.transitions,
                transient_errors = report.transient_errors,
                "Poll round complete",
            );
            observer(batch, &report);

            if !batch.has_pending_poll() {
                return PollExit::Finished;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollExit::Cancelled,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

fn log_transition(job: &Job, task_id: &str, transition: Transition) {
    let job_id = job.id();
    match transition {
        Transition::Started => {
            tracing::debug!(job_id, task_id, "Generation started");
        }
        Transition::Succeeded => match job.result_url() {
            Some(url) => tracing::info!(job_id, task_id, url, "Generation succeeded"),
            None => tracing::warn!(job_id, task_id, "Generation succeeded without a result URL"),
        },
        Transition::Failed => {
            let error = job.error().unwrap_or_default();
            tracing::warn!(job_id, task_id, error, "Generation failed");
        }
        Transition::Unchanged | Transition::Ignored => {}
    }
}
