use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracegrade_core::adapter::AdapterKind;
use tracegrade_core::baseline::{BaselineEntry, BaselineStore};
use tracegrade_core::config::{parse_test_case, EvalSettings};
use tracegrade_core::engine::SuiteOptions;
use tracegrade_core::judge::LocalJudge;
use tracegrade_core::model::{TestCase, Terminal};
use tracegrade_core::report::{BaselineStatus, CaseStatus};
use tracegrade_core::{EvalErrorKind, Evaluator};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn weather_case(endpoint: &str) -> TestCase {
    let yaml = format!(
        r#"
name: weather-paris
adapter: http
endpoint: {endpoint}/agent
input:
  query: "What's the weather in Paris?"
expected:
  tools: [get_weather]
  output:
    contains: ["Paris"]
    not_contains: ["error"]
thresholds:
  max_latency: 10000
"#
    );
    parse_test_case(&yaml, Path::new("weather.yaml")).unwrap()
}

async fn mount_agent(server: &MockServer, output: &str, steps: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/agent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": output,
            "metadata": {"steps": steps, "tokens": {"input": 40, "output": 10}}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn evaluate_passing_case() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_agent(&server, "Paris: sunny, 21C", json!(["get_weather"])).await;

    let evaluator = Evaluator::new(EvalSettings::default())?;
    let eval = evaluator.evaluate(&weather_case(&server.uri())).await?;

    assert_eq!(eval.trace.terminal, Terminal::Ok);
    assert!(eval.verdict.passed, "{:?}", eval.verdict.failure_reasons);
    assert_eq!(eval.verdict.final_score, 100.0);
    assert_eq!(eval.verdict.judge_score, None);
    Ok(())
}

#[tokio::test]
async fn evaluate_reports_each_failed_check() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_agent(&server, "an error occurred", json!([])).await;

    let evaluator = Evaluator::new(EvalSettings::default())?;
    let eval = evaluator.evaluate(&weather_case(&server.uri())).await?;

    assert!(!eval.verdict.passed);
    let reasons = &eval.verdict.failure_reasons;
    assert!(reasons.contains(&"missing tool: get_weather".to_string()));
    assert!(reasons.contains(&"output missing: Paris".to_string()));
    assert!(reasons.contains(&"output contains excluded: error".to_string()));
    Ok(())
}

#[tokio::test]
async fn local_judge_blends_into_final_score() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_agent(&server, "Paris is sunny", json!(["get_weather"])).await;

    let mut tc = weather_case(&server.uri());
    tc.expectation.judge_rubric = Some("Paris and temperature".into());

    let evaluator =
        Evaluator::new(EvalSettings::default())?.with_judge(Arc::new(LocalJudge::new()));
    let eval = evaluator.evaluate(&tc).await?;

    assert_eq!(eval.verdict.judge_score, Some(50.0));
    assert!((eval.verdict.final_score - 85.0).abs() < 1e-9);
    assert!(eval.verdict.passed);
    Ok(())
}

#[tokio::test]
async fn baseline_comparison_flags_new_failures() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = BaselineStore::open(dir.path())?;

    let good = MockServer::start().await;
    mount_agent(&good, "Paris: sunny", json!(["get_weather"])).await;
    let evaluator = Evaluator::new(EvalSettings::default())?;
    let tc = weather_case(&good.uri());
    let golden = evaluator.evaluate(&tc).await?;
    store.save(&BaselineEntry::new(&tc.id, golden.trace, golden.verdict))?;

    let bad = MockServer::start().await;
    mount_agent(&bad, "Paris: sunny", json!([])).await;
    let tc = weather_case(&bad.uri());
    let baseline = store.load(&tc.id)?.expect("baseline saved");
    let compared = evaluator.evaluate_with_baseline(&tc, &baseline).await?;

    let r = &compared.regression;
    assert!(r.is_regression());
    assert!(r.new_failures.contains("missing tool: get_weather"));
    assert!(r.tools_removed.contains("get_weather"));
    assert!(r.baseline_passed);
    assert!(!r.current_passed);
    assert!(r.score_delta < 0.0);
    Ok(())
}

#[tokio::test]
async fn baseline_for_another_case_is_rejected() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_agent(&server, "Paris", json!(["get_weather"])).await;
    let evaluator = Evaluator::new(EvalSettings::default())?;
    let tc = weather_case(&server.uri());
    let eval = evaluator.evaluate(&tc).await?;
    let other = BaselineEntry::new("someone-else", eval.trace, eval.verdict);

    let err = evaluator.evaluate_with_baseline(&tc, &other).await.unwrap_err();
    assert_eq!(err.kind(), EvalErrorKind::Baseline);
    Ok(())
}

#[tokio::test]
async fn suite_saves_then_compares_baselines() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = MockServer::start().await;
    mount_agent(&server, "Paris: sunny", json!(["get_weather"])).await;

    let evaluator = Evaluator::new(EvalSettings {
        parallel: 2,
        ..Default::default()
    })?;

    let mut second = weather_case(&server.uri());
    second.id = "weather-paris-2".into();
    let cases = vec![weather_case(&server.uri()), second];

    let save = SuiteOptions {
        baseline_store: Some(BaselineStore::open(dir.path())?),
        compare: false,
        save_baseline: true,
    };
    let first_run = evaluator.run_suite(cases.clone(), &save).await?;
    assert!(first_run.all_passed());
    assert_eq!(first_run.summary.baselines_saved, 2);
    assert_eq!(BaselineStore::open(dir.path())?.list()?.len(), 2);

    let compare = SuiteOptions {
        baseline_store: Some(BaselineStore::open(dir.path())?),
        compare: true,
        save_baseline: false,
    };
    let second_run = evaluator.run_suite(cases, &compare).await?;
    assert!(second_run
        .cases
        .iter()
        .all(|c| c.baseline == BaselineStatus::Compared));
    assert!(!second_run.has_regressions());
    assert_ne!(first_run.run_id, second_run.run_id);
    Ok(())
}

#[tokio::test]
async fn failed_baseline_write_is_recorded_per_case() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = BaselineStore::open(dir.path())?;
    let server = MockServer::start().await;
    mount_agent(&server, "Paris: sunny", json!(["get_weather"])).await;

    let mut blocked = weather_case(&server.uri());
    blocked.id = "blocked".into();
    let target = store.path_for("blocked");
    std::fs::create_dir_all(&target)?;
    std::fs::write(target.join("occupant"), "x")?;

    let evaluator = Evaluator::new(EvalSettings::default())?;
    let options = SuiteOptions {
        baseline_store: Some(store.clone()),
        compare: false,
        save_baseline: true,
    };
    let report = evaluator
        .run_suite(vec![blocked, weather_case(&server.uri())], &options)
        .await?;

    assert_eq!(report.summary.baselines_saved, 1);
    assert_eq!(report.summary.baselines_failed, 1);
    assert!(report.has_baseline_failures());
    let blocked = report.cases.iter().find(|c| c.test_id == "blocked").unwrap();
    assert_eq!(blocked.baseline, BaselineStatus::SaveFailed);
    assert_eq!(blocked.status, CaseStatus::Passed);
    assert!(blocked.error.as_deref().unwrap().starts_with("baseline not saved"));
    assert!(store.load("weather-paris")?.is_some());
    Ok(())
}

#[tokio::test]
async fn one_bad_case_does_not_abort_the_suite() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_agent(&server, "Paris: sunny", json!(["get_weather"])).await;

    let good = weather_case(&server.uri());
    let mut broken = weather_case(&server.uri());
    broken.id = "broken".into();
    broken.endpoint = "ftp://example.invalid".into();
    let mut langgraph = weather_case(&server.uri());
    langgraph.id = "langgraph-no-assistant".into();
    langgraph.adapter = AdapterKind::Langgraph;

    let evaluator = Evaluator::new(EvalSettings::default())?;
    let report = evaluator
        .run_suite(vec![good, broken, langgraph], &SuiteOptions::default())
        .await?;

    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.passed, 1);
    assert_eq!(report.summary.errored, 2);
    let broken = report.cases.iter().find(|c| c.test_id == "broken").unwrap();
    assert_eq!(broken.status, CaseStatus::Error);
    assert!(broken.error.as_deref().unwrap().starts_with("ConfigError:"));
    assert!(!report.all_passed());
    Ok(())
}

#[tokio::test]
async fn compare_without_store_is_a_config_error() {
    let evaluator = Evaluator::new(EvalSettings::default()).unwrap();
    let options = SuiteOptions {
        compare: true,
        ..Default::default()
    };
    let err = evaluator.run_suite(vec![], &options).await.unwrap_err();
    assert_eq!(err.kind(), EvalErrorKind::Config);
}
