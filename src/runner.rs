//! Sequential job loop with per-job failure isolation.
//!
//! Each job goes read → query → validate → merge → write. Whatever fails is
//! recorded in that job's [`JobOutcome`] and the loop moves on. Between
//! consecutive jobs the runner suspends for the configured delay, whatever
//! the previous job's outcome; that delay is the only rate-limit protection,
//! nothing is retried.

use std::time::Duration;

use tracing::{Instrument, info, info_span, warn};

use crate::agent::AgentClient;
use crate::anthropic::MessageSender;
use crate::error::JobError;
use crate::job::{Job, JobOutcome};
use crate::merge::{Document, Merged, merge};
use crate::schema::validate;
use crate::store::{read_document, write_document};
use crate::ui::JobProgress;

/// Suspension point between jobs.
#[allow(async_fn_in_trait)]
pub trait Pause {
    async fn pause(&self, duration: Duration);
}

/// Real wall-clock pause.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPause;

impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct JobRunner<S, P = TokioPause> {
    agent: AgentClient<S>,
    pause: P,
    delay: Duration,
    dry_run: bool,
    progress: bool,
}

impl<S: MessageSender> JobRunner<S, TokioPause> {
    pub fn new(agent: AgentClient<S>, delay: Duration) -> Self {
        Self {
            agent,
            pause: TokioPause,
            delay,
            dry_run: false,
            progress: false,
        }
    }
}

impl<S: MessageSender, P: Pause> JobRunner<S, P> {
    pub fn with_pause<Q: Pause>(self, pause: Q) -> JobRunner<S, Q> {
        JobRunner {
            agent: self.agent,
            pause,
            delay: self.delay,
            dry_run: self.dry_run,
            progress: self.progress,
        }
    }

    /// Compute outcomes without writing any file.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Show a terminal spinner per job.
    pub fn show_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn agent(&self) -> &AgentClient<S> {
        &self.agent
    }

    /// Runs `jobs` strictly in order and returns one outcome per job.
    pub async fn run(&self, jobs: &[Job]) -> Vec<JobOutcome> {
        let mut outcomes = Vec::with_capacity(jobs.len());

        for (idx, job) in jobs.iter().enumerate() {
            let span = info_span!("job", job = %job.name);
            let progress = self.progress.then(|| JobProgress::start(&job.name));

            let outcome = match self.run_job(job).instrument(span.clone()).await {
                Ok(merged) if merged.changed => JobOutcome::updated(job, merged.added),
                Ok(_) => JobOutcome::unchanged(job),
                Err(err) => {
                    span.in_scope(|| warn!(kind = %err.kind(), error = %err, "job failed"));
                    JobOutcome::failed(job, &err)
                }
            };
            span.in_scope(|| {
                info!(
                    status = %outcome.status,
                    records_added = outcome.records_added,
                    "job finished"
                )
            });
            if let Some(progress) = progress {
                progress.complete(&outcome);
            }
            outcomes.push(outcome);

            if idx + 1 < jobs.len() && !self.delay.is_zero() {
                info!(seconds = self.delay.as_secs(), "waiting before next job");
                self.pause.pause(self.delay).await;
            }
        }

        outcomes
    }

    /// One job's full cycle. The target file is only touched when the merge
    /// reports a change.
    pub async fn run_job(&self, job: &Job) -> Result<Merged, JobError> {
        let existing = read_document(&job.file_path, &job.schema)?;
        let raw = self.agent.query(job, existing.as_ref()).await?;
        validate(&job.schema, &raw)?;
        let incoming = Document::from_value(raw, &job.schema)?;

        let merged = merge(existing, incoming);
        if merged.changed && !self.dry_run {
            write_document(&job.file_path, &merged.document)?;
            info!(path = %job.file_path.display(), "wrote updated document");
        } else if merged.changed {
            info!(path = %job.file_path.display(), "dry run: leaving file untouched");
        }
        Ok(merged)
    }
}
