use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a single generation job.
///
/// `Queued → Running → Succeeded | Failed`; a job may also jump straight from
/// `Queued` to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one status query said about a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobUpdate {
    Generating,
    Succeeded { result_url: Option<String> },
    Failed { message: String },
}

/// The effect an update had on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Accepted, status did not change.
    Unchanged,
    /// Queued → Running.
    Started,
    Succeeded,
    Failed,
    /// The job was already terminal (or not in a state to accept the update).
    Ignored,
}

impl Transition {
    pub fn changed_status(self) -> bool {
        matches!(self, Transition::Started | Transition::Succeeded | Transition::Failed)
    }
}

/// One prompt's video generation request.
///
/// State only changes through the `mark_*`/`apply` methods, which refuse to
/// touch a job that is already terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: String,
    prompt: String,
    external_id: Option<String>,
    status: JobStatus,
    submitted_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    result_url: Option<String>,
    error: Option<String>,
    #[serde(default)]
    selected: bool,
}

impl Job {
    pub fn new(prompt: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            prompt,
            external_id: None,
            status: JobStatus::Queued,
            submitted_at: now,
            completed_at: None,
            result_url: None,
            error: None,
            selected: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn result_url(&self) -> Option<&str> {
        self.result_url.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn selected(&self) -> bool {
        self.selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Not yet sent to the API.
    pub fn needs_submission(&self) -> bool {
        self.external_id.is_none() && !self.is_terminal()
    }

    /// Sent to the API and still waiting on a result.
    pub fn needs_poll(&self) -> bool {
        self.external_id.is_some() && !self.is_terminal()
    }

    /// Time from submission to completion, for terminal jobs.
    pub fn completion_duration(&self) -> Option<TimeDelta> {
        self.completed_at
            .map(|done| (done - self.submitted_at).max(TimeDelta::zero()))
    }

    /// Record the external task id returned by the creation call.
    pub fn mark_submitted(&mut self, external_id: String, at: DateTime<Utc>) -> Transition {
        if !self.needs_submission() {
            return Transition::Ignored;
        }
        self.external_id = Some(external_id);
        self.submitted_at = at;
        Transition::Unchanged
    }

    /// The creation call failed; the job will never reach the API.
    pub fn mark_submission_failed(&mut self, message: String, at: DateTime<Utc>) -> Transition {
        if !self.needs_submission() {
            return Transition::Ignored;
        }
        self.fail(message, at)
    }

    /// Apply the result of a status query.
    pub fn apply(&mut self, update: JobUpdate, at: DateTime<Utc>) -> Transition {
        if !self.needs_poll() {
            return Transition::Ignored;
        }
        match update {
            JobUpdate::Generating => {
                if self.status == JobStatus::Queued {
                    self.status = JobStatus::Running;
                    Transition::Started
                } else {
                    Transition::Unchanged
                }
            }
            JobUpdate::Succeeded { result_url } => {
                self.status = JobStatus::Succeeded;
                self.result_url = result_url;
                self.completed_at = Some(at);
                Transition::Succeeded
            }
            JobUpdate::Failed { message } => self.fail(message, at),
        }
    }

    fn fail(&mut self, message: String, at: DateTime<Utc>) -> Transition {
        self.status = JobStatus::Failed;
        self.error = Some(message);
        self.completed_at = Some(at);
        Transition::Failed
    }
}
