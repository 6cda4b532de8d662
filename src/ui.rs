//! Terminal output: a progress bar while polling, coloured summaries after.
//!
//! Uses `indicatif` for the bar and `console` for styling.

use chrono::Local;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::tracking::{Batch, BatchStats, JobStatus, format_duration};

/// Progress bar tracking how many jobs of a batch are terminal.
pub struct BatchProgress {
    /// Position is the number of terminal jobs.
    pb: ProgressBar,
}

impl BatchProgress {
    pub fn start(total: usize) -> Self {
        let pb = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        Self { pb }
    }

    pub fn update(&self, stats: &BatchStats) {
        self.pb.set_position(stats.terminal() as u64);
        self.pb.set_message(progress_line(stats));
    }

    /// Print a line above the bar without tearing it.
    pub fn note(&self, line: &str) {
        self.pb.println(line);
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

/// "running 3 · queued 2 · ok 4 · failed 1 · elapsed 1m 5s · ETA 40s"
pub fn progress_line(stats: &BatchStats) -> String {
    let eta = stats
        .eta
        .map(format_duration)
        .unwrap_or_else(|| "estimating".to_string());
    format!(
        "running {} · queued {} · ok {} · failed {} · elapsed {} · ETA {}",
        stats.running,
        stats.queued,
        stats.succeeded,
        stats.failed,
        format_duration(stats.elapsed),
        eta,
    )
}

// Colour per status, shared by the job list and summary.
fn status_style(status: JobStatus) -> Style {
    match status {
        JobStatus::Succeeded => Style::new().green().bold(),
        JobStatus::Failed => Style::new().red().bold(),
        JobStatus::Running => Style::new().yellow(),
        JobStatus::Queued => Style::new().dim(),
    }
}

// Single-glyph marker shown before each job.
fn status_symbol(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Succeeded => "✓",
        JobStatus::Failed => "✗",
        JobStatus::Running => "↻",
        JobStatus::Queued => "·",
    }
}

/// Totals block shown after polling and by `status`.
pub fn print_summary(stats: &BatchStats) {
    let green = Style::new().green().bold();
    let red = Style::new().red().bold();
    let dim = Style::new().dim();

    println!();
    println!("{}", dim.apply_to("─── Batch Summary ───"));
    println!(
        "  total {}  {} {}  {} {}  pending {}  success rate {:.1}%",
        stats.total,
        green.apply_to("succeeded"),
        stats.succeeded,
        red.apply_to("failed"),
        stats.failed,
        stats.remaining(),
        stats.success_rate(),
    );
    println!(
        "  progress {:.0}%  elapsed {}",
        stats.progress() * 100.0,
        format_duration(stats.elapsed)
    );
    if let Some(avg) = stats.average_success {
        println!("  average generation time {}", format_duration(avg));
    } else if let Some(avg) = stats.average_completion {
        println!("  average time to finish {}", format_duration(avg));
    }
    if stats.remaining() > 0 {
        match stats.eta {
            Some(eta) => println!("  estimated remaining {}", format_duration(eta)),
            None => println!("  estimated remaining: waiting for the first job to finish"),
        }
    }
}

/// One line per job: short id, selection mark, status, finish time, prompt,
/// then the URL or error underneath.
pub fn print_jobs(batch: &Batch) {
    let dim = Style::new().dim();
    for job in batch.jobs() {
        let style = status_style(job.status());
        let short_id: String = job.id().chars().take(8).collect();
        let mark = if job.selected() { "[x]" } else { "[ ]" };
        // Local wall-clock time; blank while the job is still pending.
        let finished = job
            .completed_at()
            .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
            .unwrap_or_default();
        println!(
            "{} {} {} {:<9} {:>8} {}",
            style.apply_to(status_symbol(job.status())),
            dim.apply_to(short_id),
            mark,
            style.apply_to(job.status().as_str()),
            dim.apply_to(finished),
            truncate(job.prompt(), 60),
        );
        if let Some(url) = job.result_url() {
            println!("      {url}");
        }
        if let Some(error) = job.error() {
            println!("      {}", Style::new().red().apply_to(error));
        }
    }
}

/// First line of `text`, cut to `max` characters with an ellipsis.
fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    let cut: String = line.chars().take(max).collect();
    if cut.len() < text.len() {
        format!("{cut}…")
    } else {
        cut
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn stats() -> BatchStats {
        BatchStats {
            total: 10,
            queued: 2,
            running: 3,
            succeeded: 4,
            failed: 1,
            elapsed: Duration::from_secs(65),
            average_completion: Some(Duration::from_secs(8)),
            average_success: Some(Duration::from_secs(8)),
            eta: Some(Duration::from_secs(40)),
        }
    }

    #[test]
    fn progress_line_with_eta() {
        assert_eq!(
            progress_line(&stats()),
            "running 3 · queued 2 · ok 4 · failed 1 · elapsed 1m 5s · ETA 40s"
        );
    }

    #[test]
    fn progress_line_before_first_completion() {
        let s = BatchStats {
            eta: None,
            ..stats()
        };
        assert!(progress_line(&s).ends_with("ETA estimating"));
    }

    #[test]
    fn truncate_long_and_multiline_prompts() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 4), "abcd…");
        assert_eq!(truncate("line one\nline two", 20), "line one…");
    }
}
