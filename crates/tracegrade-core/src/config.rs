//! Test-case files and run settings.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::adapter::AdapterKind;
use crate::collector::CollectorConfig;
use crate::errors::EvalError;
use crate::model::{AdapterOptions, Expectation, TestCase, TestInput, Thresholds};
use crate::scoring::{DEFAULT_JUDGE_WEIGHT, MAX_JUDGE_WEIGHT};

// --- On-disk schema ---

#[derive(Debug, Deserialize)]
struct TestCaseFile {
    name: Option<String>,
    adapter: Option<String>,
    endpoint: Option<String>,
    input: Option<InputFile>,
    #[serde(default)]
    expected: ExpectedFile,
    #[serde(default)]
    thresholds: ThresholdsFile,
    #[serde(default)]
    adapter_options: AdapterOptions,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct InputFile {
    query: Option<String>,
    #[serde(default)]
    context: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ExpectedFile {
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    tools_unordered: bool,
    #[serde(default)]
    output: OutputFile,
    judge_rubric: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputFile {
    #[serde(default)]
    contains: Vec<String>,
    #[serde(default)]
    not_contains: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ThresholdsFile {
    min_score: Option<f64>,
    max_cost: Option<f64>,
    /// Milliseconds.
    max_latency: Option<f64>,
}

/// Load and validate one test-case file.
pub fn load_test_case(path: &Path) -> Result<TestCase, EvalError> {
    if path.is_dir() {
        return Err(EvalError::config(format!(
            "{} is a directory; pass test-case files explicitly",
            path.display()
        )));
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| EvalError::config(format!("failed to read {}: {}", path.display(), e)))?;
    parse_test_case(&raw, path)
}

/// Load every file, rejecting duplicate test ids. Order follows `paths`.
pub fn load_test_cases(paths: &[PathBuf]) -> Result<Vec<TestCase>, EvalError> {
    let mut seen = BTreeSet::new();
    let mut cases = Vec::with_capacity(paths.len());
    for path in paths {
        let tc = load_test_case(path)?;
        if !seen.insert(tc.id.clone()) {
            return Err(EvalError::config(format!(
                "{}: duplicate test name '{}'",
                path.display(),
                tc.id
            )));
        }
        cases.push(tc);
    }
    Ok(cases)
}

pub fn parse_test_case(raw: &str, origin: &Path) -> Result<TestCase, EvalError> {
    let at = origin.display();
    let file: TestCaseFile = serde_yaml::from_str(raw)
        .map_err(|e| EvalError::config(format!("{}: failed to parse YAML: {}", at, e)))?;

    let id = non_empty(file.name).ok_or_else(|| EvalError::config(format!("{}: missing 'name'", at)))?;
    let endpoint = non_empty(file.endpoint)
        .ok_or_else(|| EvalError::config(format!("{}: missing 'endpoint'", at)))?;
    let adapter = match file.adapter {
        Some(a) => a
            .parse::<AdapterKind>()
            .map_err(|e| EvalError::config(format!("{}: {}", at, e)))?,
        None => AdapterKind::Http,
    };
    let input = file
        .input
        .ok_or_else(|| EvalError::config(format!("{}: missing 'input'", at)))?;
    let query = non_empty(input.query)
        .ok_or_else(|| EvalError::config(format!("{}: missing 'input.query'", at)))?;

    let thresholds = validate_thresholds(&file.thresholds)
        .map_err(|msg| EvalError::config(format!("{}: {}", at, msg)))?;

    Ok(TestCase {
        id,
        adapter,
        endpoint,
        input: TestInput {
            query,
            context: input.context,
        },
        expectation: Expectation {
            expected_tools: file.expected.tools,
            tools_unordered: file.expected.tools_unordered,
            output_contains: dedup(file.expected.output.contains),
            output_excludes: dedup(file.expected.output.not_contains),
            judge_rubric: non_empty(file.expected.judge_rubric),
        },
        thresholds,
        adapter_options: file.adapter_options,
        tags: file.tags,
    })
}

fn validate_thresholds(t: &ThresholdsFile) -> Result<Thresholds, String> {
    for (name, value) in [
        ("min_score", t.min_score),
        ("max_cost", t.max_cost),
        ("max_latency", t.max_latency),
    ] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(format!("thresholds.{} must be a non-negative number, got {}", name, v));
            }
        }
    }
    if let Some(min) = t.min_score {
        if min > 100.0 {
            return Err(format!("thresholds.min_score must be at most 100, got {}", min));
        }
    }
    Ok(Thresholds {
        min_score: t.min_score,
        max_cost: t.max_cost,
        max_latency_ms: t.max_latency.map(|ms| ms.round() as u64),
    })
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

/// Knobs for one evaluation run.
#[derive(Debug, Clone)]
pub struct EvalSettings {
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
    pub idle_warn: Duration,
    /// Maximum number of cases in flight.
    pub parallel: usize,
    /// Judge share of the final score; capped at one third.
    pub judge_weight: f64,
    pub judge_timeout: Duration,
}

impl Default for EvalSettings {
    fn default() -> Self {
        let collector = CollectorConfig::default();
        Self {
            connect_timeout: collector.connect_timeout,
            total_timeout: collector.total_timeout,
            idle_warn: collector.idle_warn,
            parallel: 4,
            judge_weight: DEFAULT_JUDGE_WEIGHT,
            judge_timeout: Duration::from_secs(30),
        }
    }
}

impl EvalSettings {
    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            connect_timeout: self.connect_timeout,
            total_timeout: self.total_timeout,
            idle_warn: self.idle_warn,
        }
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        if self.parallel == 0 {
            return Err(EvalError::config("parallel must be at least 1"));
        }
        if self.total_timeout.is_zero() {
            return Err(EvalError::config("total timeout must be greater than zero"));
        }
        if !(0.0..=MAX_JUDGE_WEIGHT).contains(&self.judge_weight) {
            return Err(EvalError::config(format!(
                "judge weight must be within 0..={:.3}, got {}",
                MAX_JUDGE_WEIGHT, self.judge_weight
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
name: weather-paris
adapter: streaming
endpoint: http://localhost:8000/stream
input:
  query: What's the weather in Paris?
  context:
    units: metric
expected:
  tools: [get_weather, format]
  output:
    contains: [Paris, Paris, sunny]
    not_contains: [error]
  judge_rubric: Reports a temperature
thresholds:
  min_score: 70
  max_cost: 0.05
  max_latency: 5000
adapter_options:
  model: gpt-4o-mini
  headers:
    Authorization: Bearer x
tags: [smoke]
"#;

    #[test]
    fn parses_full_file() {
        let tc = parse_test_case(FULL, Path::new("weather.yaml")).unwrap();
        assert_eq!(tc.id, "weather-paris");
        assert_eq!(tc.adapter, AdapterKind::Streaming);
        assert_eq!(tc.input.context["units"], "metric");
        assert_eq!(tc.expectation.expected_tools, vec!["get_weather", "format"]);
        assert_eq!(tc.expectation.output_contains, vec!["Paris", "sunny"]);
        assert_eq!(tc.expectation.output_excludes, vec!["error"]);
        assert_eq!(tc.thresholds.max_latency_ms, Some(5000));
        assert_eq!(tc.adapter_options.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(tc.tags, vec!["smoke"]);
    }

    #[test]
    fn minimal_file_defaults_to_http() {
        let tc = parse_test_case(
            "name: t\nendpoint: http://x\ninput:\n  query: hi\n",
            Path::new("t.yaml"),
        )
        .unwrap();
        assert_eq!(tc.adapter, AdapterKind::Http);
        assert_eq!(tc.thresholds, Thresholds::default());
        assert!(!tc.expectation.has_deterministic_checks());
    }

    #[test]
    fn errors_name_the_file() {
        let err = parse_test_case("endpoint: http://x\ninput:\n  query: hi\n", Path::new("a.yaml"))
            .unwrap_err();
        assert_eq!(err.to_string(), "ConfigError: a.yaml: missing 'name'");

        let err = parse_test_case(
            "name: t\nadapter: grpc\nendpoint: http://x\ninput:\n  query: hi\n",
            Path::new("b.yaml"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown adapter 'grpc'"));

        let err = parse_test_case(
            "name: t\nendpoint: http://x\ninput:\n  query: hi\nthresholds:\n  max_cost: -1\n",
            Path::new("c.yaml"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("thresholds.max_cost"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.yaml");
        let b = dir.path().join("b.yaml");
        let body = "name: same\nendpoint: http://x\ninput:\n  query: hi\n";
        std::fs::write(&a, body).unwrap();
        std::fs::write(&b, body).unwrap();
        let err = load_test_cases(&[a, b]).unwrap_err();
        assert!(err.to_string().contains("duplicate test name 'same'"));
    }

    #[test]
    fn settings_validation() {
        assert!(EvalSettings::default().validate().is_ok());
        let bad = EvalSettings {
            judge_weight: 0.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
