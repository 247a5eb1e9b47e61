use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapter::AdapterKind;
use crate::errors::EvalError;
use crate::model::{ExecutionTrace, RegressionReport, Verdict};

pub mod console;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    Failed,
    /// The case could not be run (configuration or baseline problem).
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineStatus {
    NotRequested,
    Compared,
    Missing,
    Saved,
    /// The run finished but writing its baseline failed. The reason is in `CaseOutcome::error`.
    SaveFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub test_id: String,
    pub adapter: AdapterKind,
    pub status: CaseStatus,
    pub baseline: BaselineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<ExecutionTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regression: Option<RegressionReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaseOutcome {
    pub fn evaluated(
        test_id: impl Into<String>,
        adapter: AdapterKind,
        trace: ExecutionTrace,
        verdict: Verdict,
        regression: Option<RegressionReport>,
        baseline: BaselineStatus,
    ) -> Self {
        let status = if verdict.passed {
            CaseStatus::Passed
        } else {
            CaseStatus::Failed
        };
        Self {
            test_id: test_id.into(),
            adapter,
            status,
            baseline,
            trace: Some(trace),
            verdict: Some(verdict),
            regression,
            error: None,
        }
    }

    pub fn errored(test_id: impl Into<String>, adapter: AdapterKind, error: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            adapter,
            status: CaseStatus::Error,
            baseline: BaselineStatus::NotRequested,
            trace: None,
            verdict: None,
            regression: None,
            error: Some(error.into()),
        }
    }

    pub fn is_regression(&self) -> bool {
        self.regression.as_ref().is_some_and(RegressionReport::is_regression)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub regressions: usize,
    pub baselines_saved: usize,
    #[serde(default)]
    pub baselines_failed: usize,
}

impl SuiteSummary {
    pub fn from_cases(cases: &[CaseOutcome]) -> Self {
        let mut s = SuiteSummary {
            total: cases.len(),
            ..Default::default()
        };
        for c in cases {
            match c.status {
                CaseStatus::Passed => s.passed += 1,
                CaseStatus::Failed => s.failed += 1,
                CaseStatus::Error => s.errored += 1,
            }
            if c.is_regression() {
                s.regressions += 1;
            }
            match c.baseline {
                BaselineStatus::Saved => s.baselines_saved += 1,
                BaselineStatus::SaveFailed => s.baselines_failed += 1,
                _ => {}
            }
        }
        s
    }
}

/// Result of one suite run. Cases are sorted by test id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub summary: SuiteSummary,
    pub cases: Vec<CaseOutcome>,
}

impl SuiteReport {
    pub fn new(run_id: String, started_at: DateTime<Utc>, duration_ms: u64, mut cases: Vec<CaseOutcome>) -> Self {
        cases.sort_by(|a, b| a.test_id.cmp(&b.test_id));
        let summary = SuiteSummary::from_cases(&cases);
        Self {
            run_id,
            started_at,
            duration_ms,
            summary,
            cases,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.summary.failed == 0 && self.summary.errored == 0
    }

    pub fn has_errors(&self) -> bool {
        self.summary.errored > 0
    }

    pub fn has_regressions(&self) -> bool {
        self.summary.regressions > 0
    }

    pub fn has_baseline_failures(&self) -> bool {
        self.summary.baselines_failed > 0
    }

    pub fn write_json(&self, path: &Path) -> Result<(), EvalError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_and_sorting() {
        let cases = vec![
            CaseOutcome::errored("b", AdapterKind::Http, "ConfigError: missing"),
            CaseOutcome::errored("a", AdapterKind::Crew, "ConfigError: missing"),
        ];
        let r = SuiteReport::new("run".into(), Utc::now(), 5, cases);
        assert_eq!(r.cases[0].test_id, "a");
        assert_eq!(r.summary.errored, 2);
        assert!(!r.all_passed());
        assert!(r.has_errors());
    }

    #[test]
    fn writes_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/report.json");
        let r = SuiteReport::new("run-1".into(), Utc::now(), 0, vec![]);
        r.write_json(&path).unwrap();
        let back: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["run_id"], "run-1");
        assert_eq!(back["summary"]["total"], 0);
    }
}
