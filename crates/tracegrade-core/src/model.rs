use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::adapter::AdapterKind;

/// A loaded evaluation case. Immutable once validated by [`crate::config`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestCase {
    pub id: String,
    pub adapter: AdapterKind,
    pub endpoint: String,
    pub input: TestInput,
    #[serde(default)]
    pub expectation: Expectation,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub adapter_options: AdapterOptions,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TestInput {
    pub query: String,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Expectation {
    /// Tool names in the order they are expected to be called.
    #[serde(default)]
    pub expected_tools: Vec<String>,
    #[serde(default)]
    pub tools_unordered: bool,
    #[serde(default)]
    pub output_contains: Vec<String>,
    #[serde(default)]
    pub output_excludes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_rubric: Option<String>,
}

impl Expectation {
    /// True when at least one tool or output check is configured.
    pub fn has_deterministic_checks(&self) -> bool {
        !self.expected_tools.is_empty()
            || !self.output_contains.is_empty()
            || !self.output_excludes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Thresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AdapterOptions {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Model name used for cost estimation when the backend reports no cost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Context keys that must be present before a request is built.
    #[serde(default)]
    pub required_context: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64, cached_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cached_tokens,
        }
    }

    pub fn add(&mut self, other: &Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cached_tokens = self.cached_tokens.saturating_add(other.cached_tokens);
    }

    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0 && self.cached_tokens == 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    Ok,
    Timeout,
    BackendError,
    MalformedStream,
}

impl Terminal {
    pub fn is_ok(self) -> bool {
        matches!(self, Terminal::Ok)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Terminal::Ok => "ok",
            Terminal::Timeout => "timeout",
            Terminal::BackendError => "backend_error",
            Terminal::MalformedStream => "malformed_stream",
        }
    }
}

impl std::fmt::Display for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ToolCall,
    ToolResult,
    Message,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub index: usize,
    pub kind: StepKind,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub ok: bool,
    pub ts_offset_ms: u64,
}

/// Canonical record of one backend run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionTrace {
    pub output: String,
    pub steps: Vec<Step>,
    pub usage: Usage,
    pub cost: f64,
    pub latency_ms: u64,
    pub terminal: Terminal,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl ExecutionTrace {
    pub fn tool_calls(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.kind == StepKind::ToolCall)
    }

    pub fn tool_call_names(&self) -> Vec<&str> {
        self.tool_calls().map(|s| s.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    Terminal,
    ToolSequence,
    OutputContains,
    OutputExcludes,
    Cost,
    Latency,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckResult {
    pub name: CheckName,
    pub passed: bool,
    /// 0..=100
    pub score: f64,
    pub weight: f64,
    /// Measured value behind the result. Kept out of failure reasons so reasons stay comparable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub deterministic_score: f64,
    #[serde(default)]
    pub judge_score: Option<f64>,
    pub final_score: f64,
    pub passed: bool,
    pub failure_reasons: Vec<String>,
    #[serde(default)]
    pub checks: Vec<CheckResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_rationale: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressionReport {
    pub score_delta: f64,
    pub new_failures: BTreeSet<String>,
    pub fixed_failures: BTreeSet<String>,
    pub cost_delta: f64,
    pub latency_delta: i64,
    pub tools_added: BTreeSet<String>,
    pub tools_removed: BTreeSet<String>,
    pub baseline_passed: bool,
    pub current_passed: bool,
}

impl RegressionReport {
    pub fn has_new_failures(&self) -> bool {
        !self.new_failures.is_empty()
    }

    /// A previously passing case that no longer passes, or any new failure reason.
    pub fn is_regression(&self) -> bool {
        self.has_new_failures() || (self.baseline_passed && !self.current_passed)
    }
}
