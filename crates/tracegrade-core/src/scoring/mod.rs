//! Verdicts from traces.
//!
//! Deterministic checks dominate. The judge, when configured, contributes at most
//! [`MAX_JUDGE_WEIGHT`] of the final score and never decides on its own.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::errors::EvalError;
use crate::judge::{JudgeError, JudgeProvider, JudgeRequest, JudgeScore};
use crate::model::{ExecutionTrace, TestCase, Verdict};

mod checks;
mod compose;

pub use compose::MAX_JUDGE_WEIGHT;

pub const DEFAULT_JUDGE_WEIGHT: f64 = 0.3;
const JUDGE_RETRY_MAX_BACKOFF_MS: u64 = 250;

#[derive(Clone)]
pub struct Scorer {
    judge: Option<Arc<dyn JudgeProvider>>,
    judge_weight: f64,
    judge_timeout: Duration,
}

impl std::fmt::Debug for Scorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scorer")
            .field("judge", &self.judge.as_ref().map(|j| j.name().to_string()))
            .field("judge_weight", &self.judge_weight)
            .field("judge_timeout", &self.judge_timeout)
            .finish()
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorer {
    pub fn new() -> Self {
        Self {
            judge: None,
            judge_weight: DEFAULT_JUDGE_WEIGHT,
            judge_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_judge(mut self, judge: Arc<dyn JudgeProvider>, timeout: Duration) -> Self {
        self.judge = Some(judge);
        self.judge_timeout = timeout;
        self
    }

    /// Clamped to `0..=MAX_JUDGE_WEIGHT`.
    pub fn with_judge_weight(mut self, weight: f64) -> Self {
        self.judge_weight = if weight.is_finite() {
            weight.clamp(0.0, MAX_JUDGE_WEIGHT)
        } else {
            DEFAULT_JUDGE_WEIGHT
        };
        self
    }

    pub fn judge_weight(&self) -> f64 {
        self.judge_weight
    }

    pub fn has_judge(&self) -> bool {
        self.judge.is_some()
    }

    /// Score without consulting the judge. Pure: equal inputs give equal verdicts.
    pub fn score_deterministic(&self, trace: &ExecutionTrace, tc: &TestCase) -> Verdict {
        let outcome = checks::run_checks(trace, &tc.expectation, &tc.thresholds);
        compose::assemble(
            trace.terminal,
            outcome,
            None,
            self.judge_weight,
            &tc.thresholds,
            Vec::new(),
        )
    }

    pub async fn score(&self, trace: &ExecutionTrace, tc: &TestCase) -> Verdict {
        let outcome = checks::run_checks(trace, &tc.expectation, &tc.thresholds);
        let mut warnings = Vec::new();

        let wants_judge =
            tc.expectation.judge_rubric.is_some() || !tc.expectation.has_deterministic_checks();
        let judge = match (&self.judge, wants_judge) {
            (Some(_), true) if !trace.terminal.is_ok() => {
                warnings.push(format!(
                    "judge skipped: trace ended with {}",
                    trace.terminal
                ));
                None
            }
            (Some(judge), true) => {
                let default_rubric;
                let rubric = match tc.expectation.judge_rubric.as_deref() {
                    Some(r) => r,
                    None => {
                        default_rubric = format!(
                            "The response directly and correctly answers the query: {}",
                            tc.input.query
                        );
                        &default_rubric
                    }
                };
                let request = JudgeRequest {
                    query: &tc.input.query,
                    output: &trace.output,
                    rubric,
                };
                match self.call_judge(judge.as_ref(), &request, &tc.id).await {
                    Ok(score) => Some(score),
                    Err(e) => {
                        let degraded = EvalError::judge_unavailable(judge.name(), e.to_string());
                        warn!(
                            test_id = %tc.id,
                            provider = judge.name(),
                            error = %e,
                            "judge unavailable, scoring deterministically"
                        );
                        warnings.push(degraded.to_string());
                        None
                    }
                }
            }
            _ => None,
        };

        compose::assemble(
            trace.terminal,
            outcome,
            judge,
            self.judge_weight,
            &tc.thresholds,
            warnings,
        )
    }

    /// One attempt plus a single retry on transient failures, each bounded by the judge timeout.
    async fn call_judge(
        &self,
        judge: &dyn JudgeProvider,
        request: &JudgeRequest<'_>,
        test_id: &str,
    ) -> Result<JudgeScore, JudgeError> {
        use rand::Rng;

        let timeout_ms = u64::try_from(self.judge_timeout.as_millis()).unwrap_or(u64::MAX);
        let mut retried = false;
        loop {
            let result = match tokio::time::timeout(self.judge_timeout, judge.judge(request)).await {
                Ok(r) => r,
                Err(_) => Err(JudgeError::Timeout {
                    after_ms: timeout_ms,
                }),
            };
            match result {
                Err(e) if e.is_transient() && !retried => {
                    retried = true;
                    let backoff = Duration::from_millis(
                        rand::thread_rng().gen_range(10..=JUDGE_RETRY_MAX_BACKOFF_MS),
                    );
                    warn!(
                        test_id,
                        provider = judge.name(),
                        error = %e,
                        backoff_ms = backoff.as_millis(),
                        "retrying judge call"
                    );
                    tokio::time::sleep(backoff).await;
                }
                other => return other,
            }
        }
    }
}
