use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{Job, JobUpdate, Transition};
use crate::error::VeoError;

pub const DEFAULT_MODEL: &str = "veo3_fast";
pub const DEFAULT_ASPECT_RATIO: &str = "16:9";

/// Generation settings shared by every job in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSettings {
    pub model: String,
    pub aspect_ratio: String,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
        }
    }
}

/// The jobs created from one submission, in prompt order.
///
/// Membership is fixed at construction. Job state is only changed through
/// the index-based methods used by the submitter and poller, plus
/// [`Batch::select`] for the user's choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    id: String,
    created_at: DateTime<Utc>,
    settings: VideoSettings,
    jobs: Vec<Job>,
}

impl Batch {
    /// One job per prompt. Prompts must be non-empty.
    pub fn new(prompts: Vec<String>, settings: VideoSettings) -> Result<Self, VeoError> {
        if prompts.is_empty() {
            return Err(VeoError::NoPrompts);
        }
        if let Some(pos) = prompts.iter().position(|p| p.trim().is_empty()) {
            return Err(VeoError::EmptyPrompt(pos + 1));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            settings,
            jobs: prompts.into_iter().map(|p| Job::new(p, now)).collect(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn settings(&self) -> &VideoSettings {
        &self.settings
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Every job is succeeded or failed.
    pub fn is_finished(&self) -> bool {
        self.jobs.iter().all(Job::is_terminal)
    }

    /// Indices of jobs whose creation call has not happened yet.
    pub fn pending_submission(&self) -> Vec<usize> {
        self.jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| job.needs_submission())
            .map(|(i, _)| i)
            .collect()
    }

    /// `(index, external id)` of every job still waiting on the API.
    pub fn pending_poll(&self) -> Vec<(usize, String)> {
        self.jobs
            .iter()
            .enumerate()
            .filter_map(|(i, job)| match job.external_id() {
                Some(task_id) if !job.is_terminal() => Some((i, task_id.to_string())),
                _ => None,
            })
            .collect()
    }

    pub fn has_pending_poll(&self) -> bool {
        self.jobs.iter().any(Job::needs_poll)
    }

    pub fn mark_submitted(&mut self, index: usize, external_id: String, at: DateTime<Utc>) -> Transition {
        match self.jobs.get_mut(index) {
            Some(job) => job.mark_submitted(external_id, at),
            None => Transition::Ignored,
        }
    }

    pub fn mark_submission_failed(&mut self, index: usize, message: String, at: DateTime<Utc>) -> Transition {
        match self.jobs.get_mut(index) {
            Some(job) => job.mark_submission_failed(message, at),
            None => Transition::Ignored,
        }
    }

    pub fn apply(&mut self, index: usize, update: JobUpdate, at: DateTime<Utc>) -> Transition {
        match self.jobs.get_mut(index) {
            Some(job) => job.apply(update, at),
            None => Transition::Ignored,
        }
    }

    /// Set the user's selection flag on a job (full id or unique prefix).
    pub fn select(&mut self, id: &str, selected: bool) -> Result<&Job, VeoError> {
        let index = self.position(id)?;
        let job = &mut self.jobs[index];
        job.set_selected(selected);
        Ok(job)
    }

    fn position(&self, id: &str) -> Result<usize, VeoError> {
        if let Some(exact) = self.jobs.iter().position(|j| j.id() == id) {
            return Ok(exact);
        }
        if id.is_empty() {
            return Err(VeoError::JobNotFound(id.to_string()));
        }
        let mut matches = self
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.id().starts_with(id));
        match (matches.next(), matches.next()) {
            (Some((i, _)), None) => Ok(i),
            (Some(_), Some(_)) => Err(VeoError::AmbiguousJobId(id.to_string())),
            (None, _) => Err(VeoError::JobNotFound(id.to_string())),
        }
    }
}
