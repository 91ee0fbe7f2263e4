//! Run configuration loaded from `sentinel.config.yaml`.
//!
//! [`SentinelConfig`] holds the global API settings, the optional change
//! proposal settings and the ordered job list. Missing values fall back to
//! defaults. Files ending in `.toml` are parsed as TOML, everything else as
//! YAML. The API key is taken from the `ANTHROPIC_API_KEY` environment
//! variable, then from a `.env` file beside the config or in the working
//! directory, then from the config file itself.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::job::{DEFAULT_MAX_SEARCHES, DEFAULT_MODEL, Job};
use crate::schema::Schema;

pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub proposal: ProposalConfig,

    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

/// Provider settings shared by every job.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Seconds to wait between consecutive jobs.
    #[serde(default = "default_delay_between_jobs")]
    pub delay_between_jobs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Web searches the agent may run per job.
    #[serde(default = "default_max_searches")]
    pub max_searches: u32,

    /// Whole-request timeout; searches make responses slow.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// API root override, e.g. for a proxy.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: String,
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_delay_between_jobs() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_searches() -> u32 {
    DEFAULT_MAX_SEARCHES
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            delay_between_jobs: default_delay_between_jobs(),
            max_tokens: default_max_tokens(),
            max_searches: default_max_searches(),
            timeout_secs: default_timeout_secs(),
            base_url: None,
            api_key: String::new(),
        }
    }
}

/// Where and how changed files are committed after a run.
#[derive(Debug, Clone, Deserialize)]
pub struct ProposalConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_repo_path")]
    pub repo_path: PathBuf,

    /// Branch to create (or reuse) before committing; current branch if unset.
    #[serde(default)]
    pub branch: Option<String>,
}

fn default_repo_path() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repo_path: default_repo_path(),
            branch: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub instruction: String,
    pub file_path: PathBuf,
    pub schema: Schema,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_searches: Option<u32>,
}

/// Reads `ANTHROPIC_API_KEY` from `.env` beside `config_path`, falling back
/// to `.env` in the working directory. The process environment is left alone.
pub fn dotenv_api_key(config_path: &Path) -> Option<String> {
    let beside_config = match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(".env"),
        _ => PathBuf::from(".env"),
    };
    [beside_config, PathBuf::from(".env")]
        .iter()
        .find_map(|env_file| {
            dotenvy::from_path_iter(env_file)
                .ok()?
                .flatten()
                .find(|(key, value)| key == API_KEY_VAR && !value.is_empty())
                .map(|(_, value)| value)
        })
}

impl SentinelConfig {
    /// Loads and validates the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = if path.extension().is_some_and(|ext| ext == "toml") {
            Self::from_toml_str(&contents)?
        } else {
            Self::from_yaml_str(&contents)?
        };

        let from_env = std::env::var(API_KEY_VAR).ok().filter(|key| !key.is_empty());
        if let Some(key) = from_env.or_else(|| dotenv_api_key(path)) {
            config.api.api_key = key;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Checks everything that must hold before a single job runs. The API
    /// key is checked separately, since `validate` and `describe` never call
    /// the provider.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.api.provider.eq_ignore_ascii_case("anthropic") {
            return Err(ConfigError::UnsupportedProvider(self.api.provider.clone()));
        }
        if self.jobs.is_empty() {
            return Err(ConfigError::NoJobs);
        }

        let mut names = HashSet::new();
        for job in &self.jobs {
            if !names.insert(job.name.as_str()) {
                return Err(ConfigError::DuplicateJob(job.name.clone()));
            }
            let invalid = |message: &str| ConfigError::InvalidJob {
                job: job.name.clone(),
                message: message.to_string(),
            };
            if job.name.trim().is_empty() {
                return Err(invalid("name must not be empty"));
            }
            if job.instruction.trim().is_empty() {
                return Err(invalid("instruction must not be empty"));
            }
            if job.file_path.as_os_str().is_empty() {
                return Err(invalid("file_path must not be empty"));
            }
            if matches!(job.schema, Schema::Scalar(_)) {
                return Err(invalid("top-level schema must be an array or an object"));
            }
        }
        Ok(())
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        if self.api.api_key.is_empty() {
            Err(ConfigError::MissingApiKey)
        } else {
            Ok(&self.api.api_key)
        }
    }

    /// Resolves the job list in configured order.
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs
            .iter()
            .map(|job| Job::from_config(job, &self.api))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
api:
  provider: anthropic
  model: claude-sonnet-4-5
  delay_between_jobs: 5
jobs:
  - name: academic-awards
    instruction: Find recent awards won by the lab.
    file_path: data/awards.json
    schema:
      type: array
      items:
        title: string
        date: YYYY-MM-DD
  - name: pricing
    instruction: Find the current price.
    file_path: data/pricing.json
    model: claude-haiku-4-5
    max_searches: 2
    schema:
      price: number
      currency: string
"#;

    #[test]
    fn default_api_values() {
        let api = ApiConfig::default();
        assert_eq!(api.provider, "anthropic");
        assert_eq!(api.model, DEFAULT_MODEL);
        assert_eq!(api.delay_between_jobs, 60);
        assert_eq!(api.max_tokens, 4096);
        assert_eq!(api.max_searches, 5);
        assert_eq!(api.timeout_secs, 300);
        assert!(api.api_key.is_empty());
    }

    #[test]
    fn parses_yaml_and_resolves_jobs() {
        let config = SentinelConfig::from_yaml_str(YAML).unwrap();
        config.validate().unwrap();
        assert_eq!(config.api.delay_between_jobs, 5);
        assert!(!config.proposal.enabled);

        let jobs = config.jobs();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name, "academic-awards");
        assert!(jobs[0].schema.is_array());
        assert_eq!(jobs[0].model, "claude-sonnet-4-5");
        assert_eq!(jobs[1].model, "claude-haiku-4-5");
        assert_eq!(jobs[1].max_searches, 2);
        assert!(matches!(jobs[1].schema, Schema::Object(_)));
    }

    #[test]
    fn parses_partial_toml() {
        let toml_str = r#"
            [api]
            api_key = "sk-test-123"
            max_tokens = 8192

            [proposal]
            enabled = true
            branch = "sentinel/updates"

            [[jobs]]
            name = "news"
            instruction = "Find news"
            file_path = "news.json"
            schema = [{ title = "string", url = "string" }]
        "#;
        let config = SentinelConfig::from_toml_str(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.require_api_key().unwrap(), "sk-test-123");
        assert_eq!(config.api.max_tokens, 8192);
        assert_eq!(config.api.delay_between_jobs, 60);
        assert!(config.proposal.enabled);
        assert_eq!(config.proposal.branch.as_deref(), Some("sentinel/updates"));
        assert!(config.jobs[0].schema.is_array());
    }

    #[test]
    fn rejects_unknown_schema_tag_at_load() {
        let yaml = YAML.replace("date: YYYY-MM-DD", "date: timestamp");
        let err = SentinelConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("unknown type `timestamp`"), "{err}");
    }

    #[test]
    fn validation_errors() {
        let mut config = SentinelConfig::from_yaml_str(YAML).unwrap();
        config.api.provider = "openai".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedProvider(p)) if p == "openai"
        ));

        let mut config = SentinelConfig::from_yaml_str(YAML).unwrap();
        config.jobs[1].name = "academic-awards".into();
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateJob(_))));

        let mut config = SentinelConfig::from_yaml_str(YAML).unwrap();
        config.jobs[0].instruction = "  ".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidJob { .. })));

        let mut config = SentinelConfig::from_yaml_str(YAML).unwrap();
        config.jobs[0].schema = serde_yaml::from_str("string").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidJob { .. })));

        let mut config = SentinelConfig::from_yaml_str(YAML).unwrap();
        config.jobs.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoJobs)));
    }

    #[test]
    fn missing_api_key_is_reported() {
        let config = SentinelConfig::from_yaml_str(YAML).unwrap();
        assert!(matches!(config.require_api_key(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn load_reads_file_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let config = SentinelConfig::load(file.path()).unwrap();
        assert_eq!(config.jobs.len(), 2);
    }

    #[test]
    fn example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("sentinel.config.example.yaml");
        let config = SentinelConfig::load(&path).unwrap();
        let jobs = config.jobs();
        assert_eq!(jobs[0].max_searches, DEFAULT_MAX_SEARCHES);
        assert_eq!(jobs[1].max_searches, 3);
        assert!(!jobs[1].schema.is_array());
    }

    #[test]
    fn api_key_is_read_from_dotenv_beside_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("sentinel.config.yaml");
        std::fs::write(&config_path, YAML).unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "# local secrets\nOTHER=1\nANTHROPIC_API_KEY=sk-from-dotenv\n",
        )
        .unwrap();

        assert_eq!(dotenv_api_key(&config_path).as_deref(), Some("sk-from-dotenv"));

        let config = SentinelConfig::load(&config_path).unwrap();
        if std::env::var(API_KEY_VAR).map_or(true, |key| key.is_empty()) {
            assert_eq!(config.require_api_key().unwrap(), "sk-from-dotenv");
        }
    }

    #[test]
    fn dotenv_without_key_is_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("sentinel.config.yaml");
        std::fs::write(dir.path().join(".env"), "ANTHROPIC_API_KEY=\nOTHER=1\n").unwrap();
        let from_cwd = dotenvy::from_path_iter(".env").ok().and_then(|iter| {
            iter.flatten()
                .find(|(key, value)| key == API_KEY_VAR && !value.is_empty())
        });
        if from_cwd.is_none() {
            assert_eq!(dotenv_api_key(&config_path), None);
        }
    }

    #[test]
    fn load_missing_file_fails() {
        let err = SentinelConfig::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
