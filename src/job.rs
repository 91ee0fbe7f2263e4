use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ApiConfig, JobConfig};
use crate::error::{FailureKind, JobError};
use crate::schema::Schema;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_MAX_SEARCHES: u32 = 5;

/// One configured unit of work: instruction + schema + target file.
/// Built once from configuration and never mutated.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub instruction: String,
    pub file_path: PathBuf,
    pub schema: Schema,
    /// Model identifier after applying the per-job override.
    pub model: String,
    /// Web search budget after applying the per-job override.
    pub max_searches: u32,
}

impl Job {
    pub fn new(
        name: impl Into<String>,
        instruction: impl Into<String>,
        file_path: impl Into<PathBuf>,
        schema: Schema,
    ) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            file_path: file_path.into(),
            schema,
            model: DEFAULT_MODEL.to_string(),
            max_searches: DEFAULT_MAX_SEARCHES,
        }
    }

    /// Resolves a configured job against the global API settings.
    pub fn from_config(config: &JobConfig, api: &ApiConfig) -> Self {
        Self {
            name: config.name.clone(),
            instruction: config.instruction.clone(),
            file_path: config.file_path.clone(),
            schema: config.schema.clone(),
            model: config.model.clone().unwrap_or_else(|| api.model.clone()),
            max_searches: config.max_searches.unwrap_or(api.max_searches),
        }
    }
}

/// Per-job result of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Unchanged,
    Updated,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Unchanged => write!(f, "unchanged"),
            JobStatus::Updated => write!(f, "updated"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Reported, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_name: String,
    pub file_path: PathBuf,
    pub status: JobStatus,
    pub records_added: usize,
    /// Records this run appended, so `--json` consumers see what changed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_records: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
}

impl JobOutcome {
    pub fn unchanged(job: &Job) -> Self {
        Self::new(job, JobStatus::Unchanged, Vec::new(), None)
    }

    pub fn updated(job: &Job, new_records: Vec<Value>) -> Self {
        Self::new(job, JobStatus::Updated, new_records, None)
    }

    pub fn failed(job: &Job, err: &JobError) -> Self {
        let failure = JobFailure {
            kind: err.kind(),
            message: err.to_string(),
        };
        Self::new(job, JobStatus::Failed, Vec::new(), Some(failure))
    }

    fn new(
        job: &Job,
        status: JobStatus,
        new_records: Vec<Value>,
        error: Option<JobFailure>,
    ) -> Self {
        Self {
            job_name: job.name.clone(),
            file_path: job.file_path.clone(),
            status,
            records_added: new_records.len(),
            new_records,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentError;
    use serde_json::json;

    fn schema() -> Schema {
        serde_yaml::from_str("[{title: string}]").unwrap()
    }

    #[test]
    fn job_defaults() {
        let job = Job::new("news", "Find news", "data/news.json", schema());
        assert_eq!(job.model, DEFAULT_MODEL);
        assert_eq!(job.max_searches, DEFAULT_MAX_SEARCHES);
        assert_eq!(job.file_path, PathBuf::from("data/news.json"));
    }

    #[test]
    fn from_config_applies_overrides() {
        let api = ApiConfig {
            model: "global-model".into(),
            max_searches: 3,
            ..ApiConfig::default()
        };
        let mut config = JobConfig {
            name: "news".into(),
            instruction: "Find news".into(),
            file_path: "news.json".into(),
            schema: schema(),
            model: None,
            max_searches: None,
        };
        let job = Job::from_config(&config, &api);
        assert_eq!(job.model, "global-model");
        assert_eq!(job.max_searches, 3);

        config.model = Some("job-model".into());
        config.max_searches = Some(9);
        let job = Job::from_config(&config, &api);
        assert_eq!(job.model, "job-model");
        assert_eq!(job.max_searches, 9);
    }

    #[test]
    fn failed_outcome_records_kind_and_message() {
        let job = Job::new("news", "Find news", "news.json", schema());
        let err = JobError::from(AgentError::Transport("connection refused".into()));
        let outcome = JobOutcome::failed(&job, &err);
        assert_eq!(outcome.status, JobStatus::Failed);
        let failure = outcome.error.unwrap();
        assert_eq!(failure.kind, FailureKind::Transport);
        assert!(failure.message.contains("connection refused"));
    }

    #[test]
    fn outcome_serializes_status_in_snake_case() {
        let job = Job::new("news", "Find news", "news.json", schema());
        let records = vec![json!({"title": "A"}), json!({"title": "B"})];
        let json = serde_json::to_value(JobOutcome::updated(&job, records)).unwrap();
        assert_eq!(json["status"], "updated");
        assert_eq!(json["records_added"], 2);
        assert_eq!(json["new_records"], json!([{"title": "A"}, {"title": "B"}]));
        assert!(json.get("error").is_none());

        let json = serde_json::to_value(JobOutcome::unchanged(&job)).unwrap();
        assert!(json.get("new_records").is_none());
    }
}
