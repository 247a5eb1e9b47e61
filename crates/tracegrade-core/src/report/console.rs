//! Plain-text suite listing for terminals and CI logs.

use std::fmt::Write as _;

use super::{BaselineStatus, CaseOutcome, CaseStatus, SuiteReport};

fn status_label(c: &CaseOutcome) -> &'static str {
    match c.status {
        CaseStatus::Passed if c.is_regression() => "REGR",
        CaseStatus::Passed => "PASS",
        CaseStatus::Failed if c.is_regression() => "REGR",
        CaseStatus::Failed => "FAIL",
        CaseStatus::Error => "ERROR",
    }
}

/// One line per case plus indented reasons, then a totals line.
#[must_use]
pub fn render(report: &SuiteReport) -> String {
    let mut out = String::new();
    for c in &report.cases {
        let _ = write!(out, "{:<5} {}", status_label(c), c.test_id);
        if let Some(v) = &c.verdict {
            let _ = write!(out, "  score={:.1}", v.final_score);
            if let Some(j) = v.judge_score {
                let _ = write!(out, " judge={:.1}", j);
            }
        }
        if let Some(t) = &c.trace {
            let _ = write!(out, "  {}ms  ${:.4}", t.latency_ms, t.cost);
        }
        match c.baseline {
            BaselineStatus::Missing => out.push_str("  (no baseline)"),
            BaselineStatus::Saved => out.push_str("  (baseline saved)"),
            BaselineStatus::SaveFailed => out.push_str("  (baseline NOT saved)"),
            BaselineStatus::Compared | BaselineStatus::NotRequested => {}
        }
        out.push('\n');

        if let Some(e) = &c.error {
            let _ = writeln!(out, "      error: {}", e);
        }
        if let Some(diagnostic) = c.trace.as_ref().and_then(|t| t.diagnostic.as_deref()) {
            let _ = writeln!(out, "      diagnostic: {}", diagnostic);
        }
        if let Some(v) = &c.verdict {
            for reason in &v.failure_reasons {
                let _ = writeln!(out, "      - {}", reason);
            }
            for warning in &v.warnings {
                let _ = writeln!(out, "      ! {}", warning);
            }
        }
        if let Some(r) = &c.regression {
            for f in &r.new_failures {
                let _ = writeln!(out, "      + new failure: {}", f);
            }
            for f in &r.fixed_failures {
                let _ = writeln!(out, "      ~ fixed: {}", f);
            }
            for t in &r.tools_removed {
                let _ = writeln!(out, "      + tool no longer called: {}", t);
            }
            if r.score_delta.abs() >= 0.05 {
                let _ = writeln!(out, "      score delta: {:+.1}", r.score_delta);
            }
        }
    }

    let s = &report.summary;
    let _ = write!(
        out,
        "\nSummary: {} total, {} passed, {} failed, {} errors",
        s.total, s.passed, s.failed, s.errored
    );
    if s.regressions > 0 {
        let _ = write!(out, ", {} regressions", s.regressions);
    }
    if s.baselines_saved > 0 {
        let _ = write!(out, ", {} baselines saved", s.baselines_saved);
    }
    if s.baselines_failed > 0 {
        let _ = write!(out, ", {} baselines failed to save", s.baselines_failed);
    }
    let _ = writeln!(out, " ({}ms, run {})", report.duration_ms, report.run_id);
    out
}
