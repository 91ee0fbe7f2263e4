use std::process::ExitCode;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::error;

use sentinel_searcher::cli::{Cli, Command};
use sentinel_searcher::config::SentinelConfig;
use sentinel_searcher::orchestrator::{self, RunOptions};
use sentinel_searcher::schema::describe;
use sentinel_searcher::{telemetry, ui};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = telemetry::init_logging(cli.verbose) {
        eprintln!("warning: {e:#}");
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = SentinelConfig::load(&cli.config)?;
    if let Some(model) = cli.model {
        config.api.model = model;
    }

    match cli.command {
        Command::Run {
            dry_run,
            no_proposal,
            delay,
            json,
        } => {
            let opts = RunOptions {
                dry_run,
                propose: !no_proposal,
                delay_secs: delay,
                progress: !json,
            };
            let summary = orchestrator::run_from_config(&config, &opts).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                ui::print_summary(&summary);
            }
            Ok(exit_code(!summary.has_failures()))
        }
        Command::Validate => {
            let checks = orchestrator::check_files(&config.jobs());
            ui::print_file_checks(&checks);
            Ok(exit_code(checks.iter().all(|c| c.result.is_ok())))
        }
        Command::Describe { job } => {
            let jobs = config.jobs();
            let selected: Vec<_> = match &job {
                Some(name) => jobs.iter().filter(|j| &j.name == name).collect(),
                None => jobs.iter().collect(),
            };
            if selected.is_empty() {
                bail!("no job named `{}`", job.unwrap_or_default());
            }
            for job in selected {
                println!("# {} -> {}", job.name, job.file_path.display());
                println!("{}\n", describe(&job.schema));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
