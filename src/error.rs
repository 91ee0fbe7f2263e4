use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::{AgentError, MalformedResponse};
use crate::schema::SchemaMismatch;

/// Fatal problems found before any job runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported provider `{0}`; only `anthropic` is supported")]
    UnsupportedProvider(String),

    #[error("no jobs configured")]
    NoJobs,

    #[error("duplicate job name: {0}")]
    DuplicateJob(String),

    #[error("job `{job}`: {message}")]
    InvalidJob { job: String, message: String },

    #[error("no API key found; set ANTHROPIC_API_KEY in the environment or a .env file")]
    MissingApiKey,
}

/// Anything that can fail a single job. Never aborts the run.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Schema(#[from] SchemaMismatch),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("existing file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl JobError {
    pub fn kind(&self) -> FailureKind {
        match self {
            JobError::Agent(AgentError::Transport(_)) => FailureKind::Transport,
            JobError::Agent(AgentError::MalformedResponse(MalformedResponse::WrongShape(_))) => {
                FailureKind::SchemaMismatch
            }
            JobError::Agent(AgentError::MalformedResponse(_)) => FailureKind::MalformedResponse,
            JobError::Schema(_) => FailureKind::SchemaMismatch,
            JobError::Read { .. } | JobError::Parse { .. } | JobError::Write { .. } => {
                FailureKind::Io
            }
        }
    }
}

/// Classifies a job failure for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Provider unreachable, timed out, rejected credentials or rate limited.
    Transport,
    /// Agent answered, but not with usable JSON.
    MalformedResponse,
    /// JSON did not conform to the job's schema.
    SchemaMismatch,
    /// Reading or writing the target file failed.
    Io,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Transport => write!(f, "transport"),
            FailureKind::MalformedResponse => write!(f, "malformed response"),
            FailureKind::SchemaMismatch => write!(f, "schema mismatch"),
            FailureKind::Io => write!(f, "io"),
        }
    }
}
