//! Regression detection against stored golden runs.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ExecutionTrace, RegressionReport, Verdict};

pub mod store;

pub use store::{BaselineError, BaselineStore, BASELINE_FORMAT_VERSION};

/// A trace and the verdict it earned, borrowed for comparison.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub trace: &'a ExecutionTrace,
    pub verdict: &'a Verdict,
}

impl<'a> Snapshot<'a> {
    pub fn new(trace: &'a ExecutionTrace, verdict: &'a Verdict) -> Self {
        Self { trace, verdict }
    }
}

/// A stored golden run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BaselineEntry {
    pub version: u32,
    pub test_id: String,
    pub created_at: DateTime<Utc>,
    pub trace: ExecutionTrace,
    pub verdict: Verdict,
}

impl BaselineEntry {
    pub fn new(test_id: impl Into<String>, trace: ExecutionTrace, verdict: Verdict) -> Self {
        Self {
            version: BASELINE_FORMAT_VERSION,
            test_id: test_id.into(),
            created_at: Utc::now(),
            trace,
            verdict,
        }
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot::new(&self.trace, &self.verdict)
    }
}

/// Diff two runs of the same case.
///
/// Keyed on failure-reason text and tool names, never on step positions. Deltas are
/// `current - baseline`. Whether a difference matters is left to the caller.
pub fn compare(current: Snapshot<'_>, baseline: Snapshot<'_>) -> RegressionReport {
    let current_reasons = reason_set(current.verdict);
    let baseline_reasons = reason_set(baseline.verdict);
    let current_tools = tool_set(current.trace);
    let baseline_tools = tool_set(baseline.trace);

    RegressionReport {
        score_delta: current.verdict.final_score - baseline.verdict.final_score,
        new_failures: current_reasons
            .difference(&baseline_reasons)
            .cloned()
            .collect(),
        fixed_failures: baseline_reasons
            .difference(&current_reasons)
            .cloned()
            .collect(),
        cost_delta: current.trace.cost - baseline.trace.cost,
        latency_delta: signed_delta(current.trace.latency_ms, baseline.trace.latency_ms),
        tools_added: current_tools
            .difference(&baseline_tools)
            .map(|s| s.to_string())
            .collect(),
        tools_removed: baseline_tools
            .difference(&current_tools)
            .map(|s| s.to_string())
            .collect(),
        baseline_passed: baseline.verdict.passed,
        current_passed: current.verdict.passed,
    }
}

fn reason_set(verdict: &Verdict) -> BTreeSet<String> {
    verdict.failure_reasons.iter().cloned().collect()
}

fn tool_set(trace: &ExecutionTrace) -> BTreeSet<&str> {
    trace.tool_call_names().into_iter().collect()
}

fn signed_delta(current: u64, baseline: u64) -> i64 {
    let c = i128::from(current);
    let b = i128::from(baseline);
    i64::try_from(c - b).unwrap_or(if c > b { i64::MAX } else { i64::MIN })
}
