use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod baseline;
pub mod run;
pub use baseline::*;
pub use run::*;

#[derive(Parser)]
#[command(
    name = "tracegrade",
    version,
    about = "Evaluate AI agent backends: collect execution traces, score them, catch regressions"
)]
pub struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true, env = "TRACEGRADE_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run test cases against their backends and score the results
    Run(RunArgs),
    /// Parse and validate test-case files without contacting any backend
    Validate(ValidateArgs),
    /// Inspect the baseline store
    Baseline(BaselineArgs),
    Version,
}

#[derive(Parser, Clone, Debug)]
pub struct ValidateArgs {
    /// Test-case YAML files
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}
