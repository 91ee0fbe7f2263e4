//! Command line interface built on clap.
//!
//! [`Cli`] carries the global flags (`--config`, `--model`, `--verbose`) and
//! one [`Command`]: `run`, `validate` or `describe`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Sentinel Searcher: keep JSON data files current with web research.
#[derive(Debug, Parser)]
#[command(name = "sentinel", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (YAML, or TOML when it ends in `.toml`).
    #[arg(long, short, global = true, default_value = "sentinel.config.yaml")]
    pub config: PathBuf,

    /// Model for jobs that do not set their own.
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every configured job and update the target files.
    Run {
        /// Query and merge, but write nothing and propose nothing.
        #[arg(long)]
        dry_run: bool,

        /// Skip the git commit even if proposals are enabled.
        #[arg(long)]
        no_proposal: bool,

        /// Seconds between jobs, overriding the configuration.
        #[arg(long)]
        delay: Option<u64>,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check existing target files against their schemas.
    Validate,

    /// Print the shape description sent to the agent.
    Describe {
        /// Only this job.
        job: Option<String>,
    },
}
