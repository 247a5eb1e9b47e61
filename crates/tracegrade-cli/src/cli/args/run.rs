//! Run command arguments.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Clone, Debug)]
pub struct RunArgs {
    /// Test-case YAML files
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Judge provider: openai, anthropic, gemini, grok, ollama or local
    #[arg(long, env = "TRACEGRADE_JUDGE")]
    pub judge: Option<String>,

    /// Judge model (default depends on the provider)
    #[arg(long, env = "TRACEGRADE_JUDGE_MODEL")]
    pub judge_model: Option<String>,

    /// Override the judge provider's API base URL
    #[arg(long, env = "TRACEGRADE_JUDGE_URL")]
    pub judge_url: Option<String>,

    /// Share of the final score given to the judge (capped at 1/3)
    #[arg(long, default_value_t = 0.3)]
    pub judge_weight: f64,

    #[arg(long, default_value_t = 30_000, env = "TRACEGRADE_JUDGE_TIMEOUT_MS")]
    pub judge_timeout_ms: u64,

    /// Directory holding one baseline file per test case
    #[arg(long, env = "TRACEGRADE_BASELINE_DIR")]
    pub baseline_dir: Option<PathBuf>,

    /// Compare each case against its stored baseline
    #[arg(long)]
    pub compare: bool,

    /// Store successful runs as the new baselines
    #[arg(long)]
    pub save_baseline: bool,

    /// Cases evaluated concurrently
    #[arg(long, default_value_t = 4, env = "TRACEGRADE_PARALLEL")]
    pub parallel: usize,

    #[arg(long, default_value_t = 10_000, env = "TRACEGRADE_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: u64,

    /// Hard limit for one backend exchange, request to terminal event
    #[arg(long, default_value_t = 120_000, env = "TRACEGRADE_TOTAL_TIMEOUT_MS")]
    pub total_timeout_ms: u64,

    /// Write the full suite report as JSON
    #[arg(long)]
    pub json_out: Option<PathBuf>,

    /// Exit non-zero when any case regressed against its baseline
    #[arg(long)]
    pub fail_on_regression: bool,
}
