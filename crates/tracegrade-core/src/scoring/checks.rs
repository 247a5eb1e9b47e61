use std::collections::BTreeSet;

use crate::model::{CheckName, CheckResult, ExecutionTrace, Expectation, Thresholds};

pub(crate) const TOOL_WEIGHT: f64 = 0.4;
pub(crate) const CONTAINS_WEIGHT: f64 = 0.3;
pub(crate) const EXCLUDES_WEIGHT: f64 = 0.1;
pub(crate) const COST_WEIGHT: f64 = 0.1;
pub(crate) const LATENCY_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone)]
pub(crate) struct DeterministicOutcome {
    pub checks: Vec<CheckResult>,
    pub failure_reasons: Vec<String>,
    pub score: f64,
    pub threshold_violated: bool,
}

/// Run every configured check. Reasons are ordered: terminal, tools, output, thresholds.
pub(crate) fn run_checks(
    trace: &ExecutionTrace,
    expectation: &Expectation,
    thresholds: &Thresholds,
) -> DeterministicOutcome {
    let mut checks = Vec::new();
    let mut reasons = Vec::new();
    let mut threshold_violated = false;

    let terminal_ok = trace.terminal.is_ok();
    if !terminal_ok {
        reasons.push(format!("run ended in {}", trace.terminal));
    }
    checks.push(CheckResult {
        name: CheckName::Terminal,
        passed: terminal_ok,
        score: if terminal_ok { 100.0 } else { 0.0 },
        weight: 0.0,
        detail: trace.diagnostic.clone(),
    });

    if !expectation.expected_tools.is_empty() {
        let actual = trace.tool_call_names();
        let (matched, total, tool_reasons) = if expectation.tools_unordered {
            match_unordered(&expectation.expected_tools, &actual)
        } else {
            match_ordered(&expectation.expected_tools, &actual)
        };
        checks.push(fraction_check(CheckName::ToolSequence, matched, total, TOOL_WEIGHT));
        reasons.extend(tool_reasons);
    }

    let output = trace.output.to_lowercase();

    if !expectation.output_contains.is_empty() {
        let missing: Vec<&String> = expectation
            .output_contains
            .iter()
            .filter(|s| !output.contains(&s.to_lowercase()))
            .collect();
        let total = expectation.output_contains.len();
        checks.push(fraction_check(
            CheckName::OutputContains,
            total - missing.len(),
            total,
            CONTAINS_WEIGHT,
        ));
        reasons.extend(missing.into_iter().map(|s| format!("output missing: {}", s)));
    }

    if !expectation.output_excludes.is_empty() {
        let present: Vec<&String> = expectation
            .output_excludes
            .iter()
            .filter(|s| output.contains(&s.to_lowercase()))
            .collect();
        let total = expectation.output_excludes.len();
        checks.push(fraction_check(
            CheckName::OutputExcludes,
            total - present.len(),
            total,
            EXCLUDES_WEIGHT,
        ));
        reasons.extend(
            present
                .into_iter()
                .map(|s| format!("output contains excluded: {}", s)),
        );
    }

    if let Some(max) = thresholds.max_cost {
        let ok = trace.cost <= max;
        if !ok {
            threshold_violated = true;
            reasons.push(format!("cost exceeded (max {:.4})", max));
        }
        let mut check = fraction_check(CheckName::Cost, usize::from(ok), 1, COST_WEIGHT);
        check.detail = Some(format!("{:.4}", trace.cost));
        checks.push(check);
    }

    if let Some(max) = thresholds.max_latency_ms {
        let ok = trace.latency_ms <= max;
        if !ok {
            threshold_violated = true;
            reasons.push(format!("latency exceeded (max {}ms)", max));
        }
        let mut check = fraction_check(CheckName::Latency, usize::from(ok), 1, LATENCY_WEIGHT);
        check.detail = Some(format!("{}ms", trace.latency_ms));
        checks.push(check);
    }

    let score = if terminal_ok {
        weighted_mean(&checks)
    } else {
        0.0
    };

    DeterministicOutcome {
        checks,
        failure_reasons: reasons,
        score,
        threshold_violated,
    }
}

/// Expected calls must appear as a subsequence of the actual calls. Extra calls are fine.
pub(crate) fn match_ordered(expected: &[String], actual: &[&str]) -> (usize, usize, Vec<String>) {
    let mut reasons = Vec::new();
    let mut cursor = 0;
    let mut matched: Vec<&str> = Vec::new();
    for name in expected {
        let name = name.as_str();
        match actual[cursor..].iter().position(|a| *a == name) {
            Some(offset) => {
                cursor += offset + 1;
                matched.push(name);
            }
            None => {
                // Called, but every unclaimed call sits before an earlier expected tool.
                let called = actual.iter().filter(|a| **a == name).count();
                let claimed = matched.iter().filter(|m| **m == name).count();
                if called > claimed {
                    reasons.push(format!("tool out of order: {}", name));
                } else {
                    reasons.push(format!("missing tool: {}", name));
                }
            }
        }
    }
    (matched.len(), expected.len(), reasons)
}

pub(crate) fn match_unordered(expected: &[String], actual: &[&str]) -> (usize, usize, Vec<String>) {
    let actual: BTreeSet<&str> = actual.iter().copied().collect();
    let mut seen = BTreeSet::new();
    let mut reasons = Vec::new();
    let mut matched = 0;
    for name in expected {
        if !seen.insert(name.as_str()) {
            continue;
        }
        if actual.contains(name.as_str()) {
            matched += 1;
        } else {
            reasons.push(format!("missing tool: {}", name));
        }
    }
    (matched, seen.len(), reasons)
}

fn fraction_check(name: CheckName, satisfied: usize, total: usize, weight: f64) -> CheckResult {
    let score = if total == 0 {
        100.0
    } else {
        satisfied as f64 * 100.0 / total as f64
    };
    CheckResult {
        name,
        passed: satisfied == total,
        score,
        weight,
        detail: None,
    }
}

fn weighted_mean(checks: &[CheckResult]) -> f64 {
    let total_weight: f64 = checks.iter().map(|c| c.weight).sum();
    if total_weight <= 0.0 {
        return 100.0;
    }
    let sum: f64 = checks.iter().map(|c| c.score * c.weight).sum();
    (sum / total_weight).clamp(0.0, 100.0)
}
