//! Baseline command arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Clone, Debug)]
pub struct BaselineArgs {
    #[command(subcommand)]
    pub cmd: BaselineSub,
}

#[derive(Subcommand, Clone, Debug)]
pub enum BaselineSub {
    /// List stored baselines
    List(BaselineListArgs),
}

#[derive(Parser, Clone, Debug)]
pub struct BaselineListArgs {
    #[arg(long, env = "TRACEGRADE_BASELINE_DIR")]
    pub baseline_dir: PathBuf,
}
