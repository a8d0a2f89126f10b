use anyhow::Result;
use clap::Parser;
use create_pull_request::config::{load_env_file, Inputs, RunContext};
use create_pull_request::github::PullRequestRecord;
use create_pull_request::service::{Service, ServiceDeps};
use create_pull_request::telemetry::{init_telemetry, LogFormat};
use create_pull_request::workflow::{self, OutputWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser)]
#[command(name = "create-pull-request")]
#[command(about = "Create, update and optionally merge a pull request from a source branch")]
#[command(long_about = "Reads its inputs from INPUT_* environment variables the way a GitHub Action does, \
                       reconciles the pull request branch with git, pushes it and opens or updates the \
                       pull request. Step outputs are written to GITHUB_OUTPUT.")]
struct Cli {
    /// TOML file with inputs; INPUT_* environment variables take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    load_env_file();
    if let Err(e) = init_telemetry(cli.log_format) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let outcome = tokio::runtime::Runtime::new()
        .map_err(anyhow::Error::from)
        .and_then(|runtime| runtime.block_on(run(&cli)));

    match outcome {
        Ok(()) => {
            info!("Action finished successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            workflow::error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let inputs = Inputs::load(cli.config.as_deref())?;
    let context = RunContext::from_env()?;
    let outputs = OutputWriter::new(context.output_file.clone());

    let deps = ServiceDeps::production(&inputs, &context)?;
    let service = Service::new(inputs, &context, deps)?;

    let mut pull = service.create_pull_request().await?;
    if pull.number != 0 && service.inputs().auto_merge {
        pull = service.merge_pull_request_with_retries(&pull).await?;
    }

    set_outputs(&outputs, &pull)?;
    Ok(())
}

fn set_outputs(outputs: &OutputWriter, pull: &PullRequestRecord) -> Result<()> {
    outputs.set_output("pull-request-number", &pull.number.to_string())?;
    outputs.set_output("pull-request-url", &pull.html_url)?;
    outputs.set_output("pull-request-operation", &pull.operation())?;
    outputs.set_output("pull-request-created", &pull.created.to_string())?;
    outputs.set_output("pull-request-head-sha", &pull.sha)?;
    outputs.set_output("pull-request-merged", &pull.merged.to_string())?;
    Ok(())
}
