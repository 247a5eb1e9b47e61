use super::checks::DeterministicOutcome;
use crate::judge::JudgeScore;
use crate::model::{Terminal, Thresholds, Verdict};

/// Upper bound on the judge's share of the final score.
pub const MAX_JUDGE_WEIGHT: f64 = 1.0 / 3.0;

pub(crate) fn blend(deterministic: f64, judge: Option<f64>, weight: f64) -> f64 {
    let w = weight.clamp(0.0, MAX_JUDGE_WEIGHT);
    let score = match judge {
        Some(j) => deterministic * (1.0 - w) + j.clamp(0.0, 100.0) * w,
        None => deterministic,
    };
    score.clamp(0.0, 100.0)
}

/// Combine check results and the optional judge score into a verdict.
///
/// Without `min_score` every deterministic check has to hold for the case to pass.
pub(crate) fn assemble(
    terminal: Terminal,
    outcome: DeterministicOutcome,
    judge: Option<JudgeScore>,
    judge_weight: f64,
    thresholds: &Thresholds,
    warnings: Vec<String>,
) -> Verdict {
    let DeterministicOutcome {
        checks,
        mut failure_reasons,
        score: deterministic_score,
        threshold_violated,
    } = outcome;

    let judge_score = judge.as_ref().map(|j| j.score);
    let final_score = blend(deterministic_score, judge_score, judge_weight);

    let score_ok = match thresholds.min_score {
        Some(min) => {
            let ok = final_score >= min;
            if !ok {
                failure_reasons.push(format!("score below minimum ({:.1})", min));
            }
            ok
        }
        None => failure_reasons.is_empty(),
    };

    Verdict {
        deterministic_score,
        judge_score,
        final_score,
        passed: terminal.is_ok() && !threshold_violated && score_ok,
        failure_reasons,
        checks,
        warnings,
        judge_rationale: judge.map(|j| j.rationale).filter(|r| !r.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn judge_weight_is_capped() {
        // A judge scoring 0 can take at most a third off a perfect deterministic score.
        let s = blend(100.0, Some(0.0), 0.9);
        assert!((s - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn no_judge_means_deterministic_score() {
        assert_eq!(blend(72.5, None, 0.3), 72.5);
    }

    #[test]
    fn final_score_bounded() {
        for det in [0.0, 50.0, 100.0] {
            for judge in [None, Some(-10.0), Some(250.0)] {
                let s = blend(det, judge, 0.3);
                assert!((0.0..=100.0).contains(&s));
            }
        }
    }
}
