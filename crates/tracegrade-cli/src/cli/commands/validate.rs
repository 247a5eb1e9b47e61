use tracegrade_core::config::load_test_cases;

use crate::cli::args::ValidateArgs;
use crate::exit_codes::{EXIT_CONFIG_ERROR, EXIT_SUCCESS};

pub fn run(args: ValidateArgs) -> anyhow::Result<i32> {
    let cases = match load_test_cases(&args.paths) {
        Ok(cases) => cases,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(EXIT_CONFIG_ERROR);
        }
    };

    for tc in &cases {
        let mut checks = Vec::new();
        if !tc.expectation.expected_tools.is_empty() {
            checks.push(format!("{} tools", tc.expectation.expected_tools.len()));
        }
        if !tc.expectation.output_contains.is_empty() || !tc.expectation.output_excludes.is_empty() {
            checks.push("output".to_string());
        }
        if tc.expectation.judge_rubric.is_some() {
            checks.push("judge".to_string());
        }
        println!(
            "ok    {}  [{}] {}  checks: {}",
            tc.id,
            tc.adapter,
            tc.endpoint,
            if checks.is_empty() {
                "judge only".to_string()
            } else {
                checks.join(", ")
            }
        );
    }
    println!("{} test case(s) valid", cases.len());
    Ok(EXIT_SUCCESS)
}
