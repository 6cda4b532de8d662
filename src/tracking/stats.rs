//! Read-time aggregate view of a batch.
//!
//! Nothing here is stored: [`BatchStats::compute`] derives counts, elapsed
//! time and the ETA from the jobs at a given instant.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use super::batch::Batch;
use super::job::JobStatus;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchStats {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// `now` minus the earliest submission time.
    pub elapsed: Duration,
    /// Mean submit-to-completion time over terminal jobs.
    pub average_completion: Option<Duration>,
    /// Mean submit-to-completion time over succeeded jobs only.
    pub average_success: Option<Duration>,
    /// `average_completion × remaining`; `None` until a job is terminal.
    pub eta: Option<Duration>,
}

impl BatchStats {
    pub fn compute(batch: &Batch, now: DateTime<Utc>) -> Self {
        let jobs = batch.jobs();
        let count = |status: JobStatus| jobs.iter().filter(|j| j.status() == status).count();

        let elapsed = jobs
            .iter()
            .map(|j| j.submitted_at())
            .min()
            .map(|start| to_std(now - start))
            .unwrap_or_default();

        let terminal: Vec<TimeDelta> = jobs.iter().filter_map(|j| j.completion_duration()).collect();
        let succeeded: Vec<TimeDelta> = jobs
            .iter()
            .filter(|j| j.status() == JobStatus::Succeeded)
            .filter_map(|j| j.completion_duration())
            .collect();

        let average_completion = mean(&terminal);
        let remaining = jobs.iter().filter(|j| !j.is_terminal()).count();
        let eta = average_completion.map(|avg| avg * remaining as u32);

        Self {
            total: jobs.len(),
            queued: count(JobStatus::Queued),
            running: count(JobStatus::Running),
            succeeded: count(JobStatus::Succeeded),
            failed: count(JobStatus::Failed),
            elapsed,
            average_completion,
            average_success: mean(&succeeded),
            eta,
        }
    }

    pub fn terminal(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn remaining(&self) -> usize {
        self.queued + self.running
    }

    /// Fraction of jobs in a terminal state, 0.0 for an empty batch.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.terminal() as f64 / self.total as f64).min(1.0)
    }

    /// Percentage of jobs that succeeded.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total as f64 * 100.0
    }
}

fn to_std(delta: TimeDelta) -> Duration {
    delta.to_std().unwrap_or_default()
}

fn mean(durations: &[TimeDelta]) -> Option<Duration> {
    if durations.is_empty() {
        return None;
    }
    let total: TimeDelta = durations.iter().copied().sum();
    Some(to_std(total) / durations.len() as u32)
}

/// Render a duration as "1d 2h 3m 4s", omitting zero units. Zero is "done".
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs == 0 {
        return "done".to_string();
    }

    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3600, rem % 3600);
    let (minutes, seconds) = (rem / 60, rem % 60);

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{JobUpdate, VideoSettings};

    fn submitted_batch(n: usize, at: DateTime<Utc>) -> Batch {
        let prompts = (0..n).map(|i| format!("p{i}")).collect();
        let mut batch = Batch::new(prompts, VideoSettings::default()).unwrap();
        for i in 0..n {
            batch.mark_submitted(i, format!("t{i}"), at);
        }
        batch
    }

    fn assert_counts_sum(stats: &BatchStats) {
        assert_eq!(
            stats.queued + stats.running + stats.succeeded + stats.failed,
            stats.total
        );
    }

    #[test]
    fn eta_undefined_until_first_terminal_job() {
        let t0 = Utc::now();
        let mut batch = submitted_batch(4, t0);
        batch.apply(0, JobUpdate::Generating, t0);

        let stats = BatchStats::compute(&batch, t0 + TimeDelta::seconds(10));
        assert_counts_sum(&stats);
        assert_eq!(stats.queued, 3);
        assert_eq!(stats.running, 1);
        assert!(stats.eta.is_none());
        assert!(stats.average_completion.is_none());
        assert_eq!(stats.elapsed, Duration::from_secs(10));
        assert_eq!(stats.progress(), 0.0);
    }

    #[test]
    fn eta_is_average_times_remaining() {
        let t0 = Utc::now();
        let mut batch = submitted_batch(4, t0);
        batch.apply(0, JobUpdate::Succeeded { result_url: Some("u".into()) }, t0 + TimeDelta::seconds(30));
        batch.apply(1, JobUpdate::Failed { message: "x".into() }, t0 + TimeDelta::seconds(50));

        let stats = BatchStats::compute(&batch, t0 + TimeDelta::seconds(60));
        assert_counts_sum(&stats);
        assert_eq!(stats.terminal(), 2);
        assert_eq!(stats.remaining(), 2);
        assert_eq!(stats.average_completion, Some(Duration::from_secs(40)));
        assert_eq!(stats.average_success, Some(Duration::from_secs(30)));
        assert_eq!(stats.eta, Some(Duration::from_secs(80)));
        assert_eq!(stats.progress(), 0.5);
        assert_eq!(stats.success_rate(), 25.0);
    }

    #[test]
    fn eta_zero_when_all_terminal() {
        let t0 = Utc::now();
        let mut batch = submitted_batch(2, t0);
        batch.apply(0, JobUpdate::Succeeded { result_url: None }, t0 + TimeDelta::seconds(5));
        batch.apply(1, JobUpdate::Succeeded { result_url: None }, t0 + TimeDelta::seconds(7));

        let stats = BatchStats::compute(&batch, t0 + TimeDelta::seconds(8));
        assert_eq!(stats.eta, Some(Duration::ZERO));
        assert_eq!(stats.progress(), 1.0);
        assert_eq!(stats.success_rate(), 100.0);
    }

    #[test]
    fn counts_sum_to_total_through_lifecycle() {
        let t0 = Utc::now();
        let mut batch = submitted_batch(3, t0);
        let updates = [
            (0, JobUpdate::Generating),
            (1, JobUpdate::Generating),
            (0, JobUpdate::Succeeded { result_url: None }),
            (2, JobUpdate::Failed { message: "x".into() }),
            (1, JobUpdate::Generating),
            (1, JobUpdate::Succeeded { result_url: None }),
        ];
        for (i, update) in updates {
            batch.apply(i, update, t0);
            let stats = BatchStats::compute(&batch, t0);
            assert_counts_sum(&stats);
            assert_eq!(stats.total, 3);
        }
    }

    #[test]
    fn clock_skew_never_goes_negative() {
        let t0 = Utc::now();
        let batch = submitted_batch(1, t0);
        let stats = BatchStats::compute(&batch, t0 - TimeDelta::seconds(5));
        assert_eq!(stats.elapsed, Duration::ZERO);
    }

    #[test]
    fn format_duration_units() {
        assert_eq!(format_duration(Duration::ZERO), "done");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
        assert_eq!(format_duration(Duration::from_secs(90_061)), "1d 1h 1m 1s");
    }
}
