use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracegrade_core::baseline::BaselineStore;
use tracegrade_core::config::{load_test_cases, EvalSettings};
use tracegrade_core::engine::SuiteOptions;
use tracegrade_core::judge::{JudgeConfig, JudgeProvider, JudgeProviderKind};
use tracegrade_core::report::{console, SuiteReport};
use tracegrade_core::{EvalError, Evaluator};

use crate::cli::args::RunArgs;
use crate::exit_codes::{EXIT_CONFIG_ERROR, EXIT_SUCCESS, EXIT_TEST_FAILURE};

pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let cases = match load_test_cases(&args.paths) {
        Ok(cases) => cases,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(EXIT_CONFIG_ERROR);
        }
    };

    let (evaluator, options) = match prepare(&args) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(EXIT_CONFIG_ERROR);
        }
    };

    let report = match evaluator.run_suite(cases, &options).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(EXIT_CONFIG_ERROR);
        }
    };

    print!("{}", console::render(&report));

    if let Some(path) = &args.json_out {
        report
            .write_json(path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    Ok(decide_exit(&report, args.fail_on_regression))
}

fn prepare(args: &RunArgs) -> Result<(Evaluator, SuiteOptions), EvalError> {
    let settings = EvalSettings {
        connect_timeout: Duration::from_millis(args.connect_timeout_ms),
        total_timeout: Duration::from_millis(args.total_timeout_ms),
        parallel: args.parallel,
        judge_weight: args.judge_weight,
        judge_timeout: Duration::from_millis(args.judge_timeout_ms),
        ..EvalSettings::default()
    };
    let mut evaluator = Evaluator::new(settings)?;
    if let Some(judge) = build_judge(args)? {
        evaluator = evaluator.with_judge(judge);
    }

    if (args.compare || args.save_baseline) && args.baseline_dir.is_none() {
        return Err(EvalError::config(
            "--compare and --save-baseline need --baseline-dir",
        ));
    }
    let baseline_store = args
        .baseline_dir
        .as_ref()
        .map(|dir| BaselineStore::open(dir.clone()))
        .transpose()?;

    Ok((
        evaluator,
        SuiteOptions {
            baseline_store,
            compare: args.compare,
            save_baseline: args.save_baseline,
        },
    ))
}

fn build_judge(args: &RunArgs) -> Result<Option<Arc<dyn JudgeProvider>>, EvalError> {
    let Some(name) = args.judge.as_deref() else {
        return Ok(None);
    };
    let kind: JudgeProviderKind = name.parse()?;
    let mut config = JudgeConfig::new(kind)
        .with_timeout(Duration::from_millis(args.judge_timeout_ms))
        .resolve_api_key_from_env();
    if let Some(model) = &args.judge_model {
        config = config.with_model(model.clone());
    }
    if let Some(url) = &args.judge_url {
        config = config.with_base_url(url.clone());
    }
    let judge = config.build()?;
    tracing::info!(provider = judge.name(), model = config.model_name(), "judge enabled");
    Ok(Some(judge))
}

/// Errored cases are configuration problems; they outrank plain test failures.
fn decide_exit(report: &SuiteReport, fail_on_regression: bool) -> i32 {
    if report.has_errors() || report.has_baseline_failures() {
        return EXIT_CONFIG_ERROR;
    }
    if report.summary.failed > 0 {
        return EXIT_TEST_FAILURE;
    }
    if fail_on_regression && report.has_regressions() {
        return EXIT_TEST_FAILURE;
    }
    EXIT_SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clap::Parser;
    use tracegrade_core::adapter::AdapterKind;
    use tracegrade_core::report::{BaselineStatus, CaseOutcome, CaseStatus};

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["run", "case.yaml"];
        argv.extend_from_slice(extra);
        RunArgs::parse_from(argv)
    }

    #[test]
    fn errored_cases_exit_with_config_error() {
        let report = SuiteReport::new(
            "r".into(),
            Utc::now(),
            1,
            vec![CaseOutcome::errored("a", AdapterKind::Http, "ConfigError: x")],
        );
        assert_eq!(decide_exit(&report, false), EXIT_CONFIG_ERROR);
    }

    #[test]
    fn unsaved_baseline_exits_with_config_error() {
        let mut outcome = CaseOutcome::errored("a", AdapterKind::Http, "baseline not saved: io");
        outcome.status = CaseStatus::Passed;
        outcome.baseline = BaselineStatus::SaveFailed;
        let report = SuiteReport::new("r".into(), Utc::now(), 1, vec![outcome]);
        assert!(!report.has_errors());
        assert_eq!(decide_exit(&report, false), EXIT_CONFIG_ERROR);
    }

    #[test]
    fn empty_suite_succeeds() {
        let report = SuiteReport::new("r".into(), Utc::now(), 0, vec![]);
        assert_eq!(decide_exit(&report, true), EXIT_SUCCESS);
    }

    #[test]
    fn compare_needs_a_baseline_dir() {
        let err = prepare(&args(&["--compare"])).unwrap_err();
        assert!(err.to_string().contains("--baseline-dir"));
    }

    #[test]
    fn unknown_judge_is_rejected() {
        let err = build_judge(&args(&["--judge", "oracle"])).err().unwrap();
        assert!(err.to_string().starts_with("ConfigError:"));
    }

    #[test]
    fn local_judge_needs_no_key() {
        let judge = build_judge(&args(&["--judge", "local"])).unwrap().unwrap();
        assert_eq!(judge.name(), "local");
    }
}
