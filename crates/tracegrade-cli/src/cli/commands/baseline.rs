use anyhow::Context;
use tracegrade_core::baseline::BaselineStore;

use crate::cli::args::BaselineListArgs;
use crate::exit_codes::EXIT_SUCCESS;

pub fn cmd_baseline_list(args: BaselineListArgs) -> anyhow::Result<i32> {
    let store = BaselineStore::open(&args.baseline_dir).with_context(|| {
        format!("failed to open baseline store {}", args.baseline_dir.display())
    })?;
    let entries = store.list().context("failed to list baselines")?;

    if entries.is_empty() {
        println!("no baselines in {}", store.dir().display());
        return Ok(EXIT_SUCCESS);
    }
    for e in &entries {
        println!(
            "{}  {}  score={:.1}  {}  tools=[{}]",
            e.test_id,
            e.created_at.format("%Y-%m-%d %H:%M:%S"),
            e.verdict.final_score,
            if e.verdict.passed { "pass" } else { "fail" },
            e.trace.tool_call_names().join(", ")
        );
    }
    println!("{} baseline(s)", entries.len());
    Ok(EXIT_SUCCESS)
}
