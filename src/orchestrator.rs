use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::agent::AgentClient;
use crate::anthropic::{AnthropicClient, MessageSender};
use crate::config::SentinelConfig;
use crate::error::JobError;
use crate::git::GitProposer;
use crate::job::{Job, JobOutcome, JobStatus};
use crate::runner::{JobRunner, Pause, TokioPause};
use crate::schema::validate;
use crate::store::read_document;

/// Opens a reviewable change for the files a run modified.
pub trait ChangeProposer {
    fn propose(&self, paths: &[PathBuf]) -> Result<ProposalResult>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalResult {
    pub branch: String,
    pub commit: String,
    pub files: usize,
}

/// Everything a run produced, in job order.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<JobOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<ProposalResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_error: Option<String>,
}

impl RunSummary {
    /// Target files of jobs that reported `updated`, in job order.
    pub fn changed_paths(&self) -> Vec<PathBuf> {
        self.outcomes
            .iter()
            .filter(|o| o.status == JobStatus::Updated)
            .map(|o| o.file_path.clone())
            .collect()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// True when any job or the change proposal failed.
    pub fn has_failures(&self) -> bool {
        self.count(JobStatus::Failed) > 0 || self.proposal_error.is_some()
    }
}

/// Per-invocation switches coming from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub propose: bool,
    /// Overrides `api.delay_between_jobs`.
    pub delay_secs: Option<u64>,
    pub progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            propose: true,
            delay_secs: None,
            progress: false,
        }
    }
}

/// Drives the runner and decides whether to propose the resulting changes.
pub struct Orchestrator<S, P = TokioPause> {
    runner: JobRunner<S, P>,
    proposer: Option<Box<dyn ChangeProposer>>,
}

impl<S: MessageSender, P: Pause> Orchestrator<S, P> {
    pub fn new(runner: JobRunner<S, P>, proposer: Option<Box<dyn ChangeProposer>>) -> Self {
        Self { runner, proposer }
    }

    pub async fn run(&self, jobs: &[Job]) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("run", %run_id, jobs = jobs.len());

        let outcomes = self.runner.run(jobs).instrument(span.clone()).await;
        let mut summary = RunSummary {
            run_id,
            started_at,
            finished_at: started_at,
            outcomes,
            proposal: None,
            proposal_error: None,
        };

        let changed = summary.changed_paths();
        let _guard = span.enter();
        match &self.proposer {
            Some(proposer) if !changed.is_empty() => match proposer.propose(&changed) {
                Ok(result) => summary.proposal = Some(result),
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "change proposal failed");
                    summary.proposal_error = Some(format!("{err:#}"));
                }
            },
            Some(_) => info!("no files changed; nothing to propose"),
            None => {}
        }

        summary.finished_at = Utc::now();
        info!(
            updated = summary.count(JobStatus::Updated),
            unchanged = summary.count(JobStatus::Unchanged),
            failed = summary.count(JobStatus::Failed),
            "run finished"
        );
        summary
    }
}

/// Builds the real client, runner and proposer from configuration and runs
/// every configured job.
pub async fn run_from_config(config: &SentinelConfig, opts: &RunOptions) -> Result<RunSummary> {
    let api_key = config.require_api_key()?.to_string();
    let timeout = Duration::from_secs(config.api.timeout_secs);
    let client = match &config.api.base_url {
        Some(base_url) => AnthropicClient::with_base_url(api_key, base_url, timeout)?,
        None => AnthropicClient::new(api_key, timeout)?,
    };

    let delay = Duration::from_secs(opts.delay_secs.unwrap_or(config.api.delay_between_jobs));
    let runner = JobRunner::new(AgentClient::new(client, config.api.max_tokens), delay)
        .dry_run(opts.dry_run)
        .show_progress(opts.progress);

    let proposer: Option<Box<dyn ChangeProposer>> =
        if opts.propose && config.proposal.enabled && !opts.dry_run {
            Some(Box::new(GitProposer::new(
                config.proposal.repo_path.clone(),
                config.proposal.branch.clone(),
            )))
        } else {
            None
        };

    let jobs = config.jobs();
    Ok(Orchestrator::new(runner, proposer).run(&jobs).await)
}

/// Result of checking one job's existing file against its schema.
#[derive(Debug)]
pub struct FileCheck {
    pub job_name: String,
    pub path: PathBuf,
    /// Entry count when the file exists and conforms, `None` when absent.
    pub result: Result<Option<usize>, JobError>,
}

/// Validates every job's current file without contacting the agent.
pub fn check_files(jobs: &[Job]) -> Vec<FileCheck> {
    jobs.iter()
        .map(|job| {
            let result = read_document(&job.file_path, &job.schema).and_then(|doc| match doc {
                Some(doc) => {
                    validate(&job.schema, &doc.to_value())?;
                    Ok(Some(doc.len()))
                }
                None => Ok(None),
            });
            FileCheck {
                job_name: job.name.clone(),
                path: job.file_path.clone(),
                result,
            }
        })
        .collect()
}
