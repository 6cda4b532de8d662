//! Sends one creation call per unsubmitted job, bounded by a semaphore.
//!
//! Each call runs on its own Tokio task; results come back in completion
//! order to [`Submitter::run`], which is the only code writing to the batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::kie::{ApiError, GenerateRequest, VideoApi};
use crate::tracking::{Batch, VideoSettings};

/// Backoff for HTTP 429 on the creation endpoint. Other errors are not retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after a rate-limited attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2000,
        }
    }
}

impl RetryConfig {
    /// delay = base_delay_ms * 2^(attempt - 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReport {
    pub submitted: usize,
    pub failed: usize,
    /// Jobs still without a creation result when the run was cancelled.
    pub pending: usize,
}

pub struct Submitter<A> {
    api: Arc<A>,
    concurrency: usize,
    retry: RetryConfig,
}

impl<A: VideoApi + 'static> Submitter<A> {
    pub fn new(api: Arc<A>, concurrency: usize, retry: RetryConfig) -> Self {
        Self {
            api,
            concurrency: concurrency.max(1),
            retry,
        }
    }

    /// Submit every job that has no external id yet, applying each creation
    /// result as soon as it arrives.
    ///
    /// A failed creation call marks only that job failed. `observer` sees the
    /// batch after every applied result. When `cancel` fires, calls that have
    /// not answered yet are aborted and their jobs stay pending submission.
    pub async fn run<F>(&self, batch: &mut Batch, cancel: &CancellationToken, mut observer: F) -> SubmitReport
    where
        F: FnMut(&Batch),
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut indexes = HashMap::new();

        for index in batch.pending_submission() {
            let req = build_request(batch.jobs()[index].prompt(), batch.settings());
            let api = Arc::clone(&self.api);
            let semaphore = Arc::clone(&semaphore);
            let retry = self.retry.clone();

            let handle = tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                let started = Utc::now();
                let result = create_with_backoff(api.as_ref(), &req, &retry).await;
                (started, result)
            });
            indexes.insert(handle.id(), index);
        }

        let mut report = SubmitReport::default();
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                joined = tasks.join_next_with_id() => joined,
            };
            let Some(joined) = joined else { break };

            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, Ok(outcome)),
                Err(e) => (e.id(), Err(e)),
            };
            let Some(&index) = indexes.get(&id) else {
                continue;
            };
            let job_id = batch.jobs()[index].id().to_string();

            match outcome {
                Ok((started, Ok(task_id))) => {
                    tracing::info!(job_id = %job_id, task_id = %task_id, "Generation task created");
                    batch.mark_submitted(index, task_id, started);
                    report.submitted += 1;
                }
                Ok((_, Err(e))) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Submission failed");
                    batch.mark_submission_failed(index, e.to_string(), Utc::now());
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Submission task aborted");
                    batch.mark_submission_failed(index, format!("submission aborted: {e}"), Utc::now());
                    report.failed += 1;
                }
            }
            observer(batch);
        }

        tasks.abort_all();
        report.pending = batch.pending_submission().len();
        if report.pending > 0 {
            tracing::warn!(pending = report.pending, "Submission cancelled");
        }

        tracing::info!(
            submitted = report.submitted,
            failed = report.failed,
            "Batch submission finished",
        );
        report
    }
}

fn build_request(prompt: &str, settings: &VideoSettings) -> GenerateRequest {
    GenerateRequest {
        prompt: prompt.to_string(),
        aspect_ratio: settings.aspect_ratio.clone(),
        model: settings.model.clone(),
        call_back_url: None,
    }
}

/// Create a task, waiting out rate limits up to `retry.max_retries` times.
async fn create_with_backoff<A: VideoApi>(
    api: &A,
    req: &GenerateRequest,
    retry: &RetryConfig,
) -> Result<String, ApiError> {
    let mut attempt = 0;
    loop {
        match api.create_task(req).await {
            Err(ApiError::RateLimited { retry_after_ms }) if attempt < retry.max_retries => {
                attempt += 1;
                let delay_ms = retry.delay_for_attempt(attempt).max(retry_after_ms);
                tracing::debug!(
                    attempt,
                    max = retry.max_retries,
                    delay_ms,
                    "Rate limited, backing off",
                );
                sleep(Duration::from_millis(delay_ms)).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::kie::TaskState;
    use crate::tracking::JobStatus;

    /// Counts concurrent creation calls and answers from a script.
    #[derive(Default)]
    struct MockApi {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
        /// Prompts that fail with `Unauthorized`.
        rejected: Vec<String>,
        /// Errors returned before falling back to success.
        scripted: Mutex<VecDeque<ApiError>>,
        /// Prompts whose creation call never answers.
        stalled: Vec<String>,
    }

    impl VideoApi for MockApi {
        async fn create_task(&self, req: &GenerateRequest) -> Result<String, ApiError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let n = self.calls.fetch_add(1, Ordering::SeqCst);

            if self.stalled.contains(&req.prompt) {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.rejected.contains(&req.prompt) {
                return Err(ApiError::Unauthorized);
            }
            if let Some(err) = self.scripted.lock().unwrap().pop_front() {
                return Err(err);
            }
            Ok(format!("task-{n}"))
        }

        async fn task_state(&self, _task_id: &str) -> Result<TaskState, ApiError> {
            Ok(TaskState::Generating)
        }
    }

    fn batch_of(n: usize) -> Batch {
        let prompts = (0..n).map(|i| format!("prompt {i}")).collect();
        Batch::new(prompts, VideoSettings::default()).unwrap()
    }

    async fn submit_all(submitter: &Submitter<MockApi>, batch: &mut Batch) -> SubmitReport {
        submitter.run(batch, &CancellationToken::new(), |_| {}).await
    }

    fn no_wait() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn concurrency_ceiling_is_respected() {
        let api = Arc::new(MockApi::default());
        let submitter = Submitter::new(Arc::clone(&api), 5, no_wait());
        let mut batch = batch_of(20);

        let report = submit_all(&submitter, &mut batch).await;

        assert_eq!(report.submitted, 20);
        assert_eq!(api.calls.load(Ordering::SeqCst), 20);
        let peak = api.max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 5, "peak concurrency was {peak}");
        assert!(peak >= 1);
        assert!(batch.jobs().iter().all(|j| j.external_id().is_some()));
        assert!(batch.jobs().iter().all(|j| j.status() == JobStatus::Queued));
    }

    #[tokio::test]
    async fn failure_marks_only_that_job() {
        let api = Arc::new(MockApi {
            rejected: vec!["prompt 1".into()],
            ..Default::default()
        });
        let submitter = Submitter::new(api, 20, no_wait());
        let mut batch = batch_of(3);

        let report = submit_all(&submitter, &mut batch).await;

        assert_eq!(
            report,
            SubmitReport {
                submitted: 2,
                failed: 1,
                pending: 0
            }
        );
        let failed = &batch.jobs()[1];
        assert_eq!(failed.status(), JobStatus::Failed);
        assert_eq!(failed.error(), Some("invalid API key"));
        assert!(failed.completed_at().is_some());
        assert!(batch.jobs()[0].needs_poll());
        assert!(batch.jobs()[2].needs_poll());
    }

    #[tokio::test]
    async fn network_errors_are_not_retried() {
        let api = Arc::new(MockApi {
            scripted: Mutex::new(VecDeque::from([ApiError::Timeout])),
            ..Default::default()
        });
        let submitter = Submitter::new(Arc::clone(&api), 1, no_wait());
        let mut batch = batch_of(1);

        submit_all(&submitter, &mut batch).await;

        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(batch.jobs()[0].status(), JobStatus::Failed);
    }

    #[tokio::test]
    async fn rate_limit_is_retried() {
        let api = Arc::new(MockApi {
            scripted: Mutex::new(VecDeque::from([
                ApiError::RateLimited { retry_after_ms: 1 },
                ApiError::RateLimited { retry_after_ms: 1 },
            ])),
            ..Default::default()
        });
        let submitter = Submitter::new(Arc::clone(&api), 1, no_wait());
        let mut batch = batch_of(1);

        let report = submit_all(&submitter, &mut batch).await;

        assert_eq!(report.submitted, 1);
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
        assert!(batch.jobs()[0].needs_poll());
    }

    #[tokio::test]
    async fn rate_limit_gives_up_after_max_retries() {
        let api = Arc::new(MockApi {
            scripted: Mutex::new(VecDeque::from([
                ApiError::RateLimited { retry_after_ms: 1 },
                ApiError::RateLimited { retry_after_ms: 1 },
            ])),
            ..Default::default()
        });
        let retry = RetryConfig {
            max_retries: 1,
            base_delay_ms: 1,
        };
        let submitter = Submitter::new(Arc::clone(&api), 1, retry);
        let mut batch = batch_of(1);

        submit_all(&submitter, &mut batch).await;

        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
        assert_eq!(batch.jobs()[0].status(), JobStatus::Failed);
    }

    #[tokio::test]
    async fn already_submitted_jobs_are_skipped() {
        let api = Arc::new(MockApi::default());
        let submitter = Submitter::new(Arc::clone(&api), 4, no_wait());
        let mut batch = batch_of(3);
        batch.mark_submitted(0, "existing".into(), Utc::now());

        let report = submit_all(&submitter, &mut batch).await;

        assert_eq!(report.submitted, 2);
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
        assert_eq!(batch.jobs()[0].external_id(), Some("existing"));
    }

    #[tokio::test]
    async fn results_are_recorded_as_they_arrive() {
        let api = Arc::new(MockApi {
            stalled: vec!["prompt 0".into()],
            ..Default::default()
        });
        let submitter = Submitter::new(Arc::clone(&api), 4, no_wait());
        let mut batch = batch_of(4);

        let interrupted =
            tokio::time::timeout(Duration::from_millis(300), submit_all(&submitter, &mut batch)).await;

        assert!(interrupted.is_err());
        assert_eq!(api.calls.load(Ordering::SeqCst), 4);
        let recorded = batch.jobs().iter().filter(|j| j.external_id().is_some()).count();
        assert_eq!(recorded, 3);
        assert_eq!(batch.pending_submission(), vec![0]);
    }

    #[tokio::test]
    async fn cancel_keeps_finished_results_and_leaves_rest_pending() {
        let api = Arc::new(MockApi {
            stalled: vec!["prompt 3".into()],
            ..Default::default()
        });
        let submitter = Submitter::new(Arc::clone(&api), 4, no_wait());
        let mut batch = batch_of(4);
        let cancel = CancellationToken::new();

        let mut seen = Vec::new();
        let trigger = cancel.clone();
        let report = submitter
            .run(&mut batch, &cancel, |b| {
                let recorded = b.jobs().iter().filter(|j| j.external_id().is_some()).count();
                seen.push(recorded);
                if recorded == 3 {
                    trigger.cancel();
                }
            })
            .await;

        assert_eq!(seen, [1, 2, 3]);
        assert_eq!(
            report,
            SubmitReport {
                submitted: 3,
                failed: 0,
                pending: 1
            }
        );
        assert_eq!(batch.pending_submission(), vec![3]);
        assert_eq!(batch.jobs()[3].status(), JobStatus::Queued);
    }

    #[tokio::test]
    async fn cancelled_before_start_submits_nothing() {
        let api = Arc::new(MockApi::default());
        let submitter = Submitter::new(Arc::clone(&api), 2, no_wait());
        let mut batch = batch_of(2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = submitter.run(&mut batch, &cancel, |_| panic!("no results expected")).await;

        assert_eq!(report.pending, 2);
        assert_eq!(batch.pending_submission(), vec![0, 1]);
    }

    #[test]
    fn retry_config_exponential_backoff() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 1000,
        };
        assert_eq!(config.delay_for_attempt(1), 1000);
        assert_eq!(config.delay_for_attempt(2), 2000);
        assert_eq!(config.delay_for_attempt(3), 4000);
        assert_eq!(config.delay_for_attempt(4), 8000);
    }
}
