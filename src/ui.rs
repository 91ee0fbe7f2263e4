//! Terminal output: per-job spinners and the colored run summary.
//!
//! Uses `indicatif` for spinners and `console` for styling. Diagnostics go
//! through `tracing`; this module only renders what a person at the terminal
//! reads.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::job::{JobOutcome, JobStatus};
use crate::orchestrator::{FileCheck, RunSummary};

/// Spinner shown while a single job runs.
pub struct JobProgress {
    pb: ProgressBar,
    styles: Styles,
}

struct Styles {
    green: Style,
    red: Style,
    dim: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            dim: Style::new().dim(),
        }
    }

    fn marker(&self, status: JobStatus) -> String {
        match status {
            JobStatus::Updated => self.green.apply_to("✓").to_string(),
            JobStatus::Unchanged => self.dim.apply_to("=").to_string(),
            JobStatus::Failed => self.red.apply_to("✗").to_string(),
        }
    }
}

impl JobProgress {
    pub fn start(job_name: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("searching: {job_name}"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            styles: Styles::new(),
        }
    }

    /// Clears the spinner and prints the one-line result.
    pub fn complete(&self, outcome: &JobOutcome) {
        self.pb.finish_and_clear();
        println!("  {} {}", self.styles.marker(outcome.status), outcome_line(outcome));
    }
}

fn outcome_line(outcome: &JobOutcome) -> String {
    match (&outcome.status, &outcome.error) {
        (JobStatus::Updated, _) => format!(
            "{}: {} new record(s) -> {}",
            outcome.job_name,
            outcome.records_added,
            outcome.file_path.display()
        ),
        (JobStatus::Unchanged, _) => format!("{}: nothing new", outcome.job_name),
        (JobStatus::Failed, Some(failure)) => {
            format!("{}: {} ({})", outcome.job_name, failure.message, failure.kind)
        }
        (JobStatus::Failed, None) => format!("{}: failed", outcome.job_name),
    }
}

/// Prints every job's outcome followed by totals and the proposal result.
pub fn print_summary(summary: &RunSummary) {
    let styles = Styles::new();
    println!();
    println!("{}", Style::new().bold().apply_to("─── Run Summary ───"));
    for outcome in &summary.outcomes {
        println!("  {} {}", styles.marker(outcome.status), outcome_line(outcome));
    }
    println!(
        "  {} updated, {} unchanged, {} failed",
        summary.count(JobStatus::Updated),
        summary.count(JobStatus::Unchanged),
        summary.count(JobStatus::Failed)
    );
    if let Some(proposal) = &summary.proposal {
        println!(
            "  {} committed {} file(s) on {} ({})",
            styles.green.apply_to("↑"),
            proposal.files,
            proposal.branch,
            proposal.commit
        );
    }
    if let Some(err) = &summary.proposal_error {
        println!("  {} change proposal failed: {err}", styles.red.apply_to("✗"));
    }
}

/// Prints the result of checking existing files against their schemas.
pub fn print_file_checks(checks: &[FileCheck]) {
    let styles = Styles::new();
    for check in checks {
        match &check.result {
            Ok(Some(entries)) => println!(
                "  {} {}: {} conforms ({entries} entries)",
                styles.green.apply_to("✓"),
                check.job_name,
                check.path.display()
            ),
            Ok(None) => println!(
                "  {} {}: {} does not exist yet",
                styles.dim.apply_to("-"),
                check.job_name,
                check.path.display()
            ),
            Err(err) => println!("  {} {}: {err}", styles.red.apply_to("✗"), check.job_name),
        }
    }
}
