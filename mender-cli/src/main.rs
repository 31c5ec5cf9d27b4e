//! # Mender CLI
//!
//! Command-line interface for running one self-healing code loop.
//!
//! Usage:
//!   mender <instruction>
//!   mender --work-dir ./sandbox <instruction>
//!
//! Examples:
//!   mender "Fetch https://example.com and print the page title"
//!   mender -v --max-regenerations 3 "Print the first 10 primes"
//!   mender --json "Count the words in a sentence" > run.json
//!
//! The final code goes to stdout; logs go to stderr.

use clap::Parser;
use mender_agent::{
    CommandInstaller, Error, Orchestrator, OrchestratorConfig, OutputPolicy, Result, RunLimits,
    RunReport, ScriptExecutor,
};
use mender_client::{BackendConfig, StreamingClient};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Parser)]
#[command(name = "mender")]
#[command(author, version, about = "Mender - generate code, run it, and fix it until its tests pass")]
struct Cli {
    /// What the program should do
    #[arg(trailing_var_arg = true, required = true)]
    instruction: Vec<String>,

    /// Directory the script is written to and dependencies are installed in
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,

    /// Runtime that executes the script [default: node]
    #[arg(long)]
    runtime: Option<String>,

    /// Extra runtime argument placed before the script path (repeatable)
    #[arg(long = "runtime-arg", allow_hyphen_values = true)]
    runtime_args: Vec<String>,

    /// Script file name inside the work dir [default: temp.mjs]
    #[arg(long)]
    script_name: Option<String>,

    /// Install command; the module name is appended [default: npm install]
    #[arg(long)]
    installer: Option<String>,

    /// Maximum regenerations per run
    #[arg(long, default_value = "10")]
    max_regenerations: usize,

    /// Maximum dependency installs per run
    #[arg(long, default_value = "5")]
    max_install_retries: usize,

    /// Primary backend timeout in seconds
    #[arg(long, default_value = "30")]
    primary_timeout: u64,

    /// Secondary backend timeout in seconds
    #[arg(long, default_value = "120")]
    secondary_timeout: u64,

    /// Substring in test output that marks a failing test
    #[arg(long, default_value = "Fail")]
    failure_marker: String,

    /// Print the full run report as JSON instead of the code
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .with_target(false)
        .try_init()
        .ok();
}

fn executor_from(cli: &Cli) -> ScriptExecutor {
    let executor = match (&cli.runtime, &cli.script_name) {
        (None, None) => ScriptExecutor::node(&cli.work_dir),
        (runtime, script_name) => ScriptExecutor::new(
            &cli.work_dir,
            script_name.as_deref().unwrap_or("temp.mjs"),
            runtime.as_deref().unwrap_or("node"),
        ),
    };
    executor.with_args(cli.runtime_args.clone())
}

fn installer_from(cli: &Cli) -> Result<CommandInstaller> {
    let Some(command) = &cli.installer else {
        return Ok(CommandInstaller::npm(&cli.work_dir));
    };

    let mut words = command.split_whitespace().map(String::from);
    let program = words.next().ok_or_else(|| {
        Error::config_invalid("installer command must not be empty").with_operation("cli::installer")
    })?;
    Ok(CommandInstaller::new(&cli.work_dir, program, words.collect()))
}

async fn run(cli: &Cli) -> Result<RunReport> {
    let api_key = std::env::var(API_KEY_VAR).map_err(|_| {
        Error::config_invalid(format!("{} is not set", API_KEY_VAR))
            .with_operation("cli::run")
            .with_context("variable", API_KEY_VAR)
    })?;

    let client = StreamingClient::new(
        api_key,
        BackendConfig::openai_chat().with_timeout(Duration::from_secs(cli.primary_timeout)),
        BackendConfig::openai_completion().with_timeout(Duration::from_secs(cli.secondary_timeout)),
    )?;
    tracing::debug!(
        primary = %client.primary().endpoint,
        secondary = %client.secondary().endpoint,
        "completion backends"
    );
    let executor = executor_from(cli);
    let installer = installer_from(cli)?;

    let config = OrchestratorConfig {
        limits: RunLimits {
            max_regenerations: cli.max_regenerations,
            max_install_retries: cli.max_install_retries,
        },
        policy: OutputPolicy::default().with_failure_marker(&cli.failure_marker)?,
    };

    let orchestrator = Orchestrator::with_config(client, executor, installer, config);
    orchestrator.run(&cli.instruction.join(" ")).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(&cli).await {
        Ok(report) => {
            tracing::info!(
                attempts = report.attempts.len(),
                regenerations = report.regenerations,
                installs = report.installs,
                "code runs and passes its tests"
            );
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error serializing report: {}", e);
                        std::process::exit(1);
                    }
                }
            } else {
                println!("{}", report.code);
            }
        }
        Err(e) => {
            tracing::error!(kind = %e.kind(), status = %e.status(), "run failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
