use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::baseline::{self, BaselineEntry, BaselineError, Snapshot};
use crate::collector::TraceCollector;
use crate::config::EvalSettings;
use crate::errors::EvalError;
use crate::judge::JudgeProvider;
use crate::model::{ExecutionTrace, RegressionReport, TestCase, Verdict};
use crate::scoring::Scorer;

mod suite;

pub use suite::SuiteOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub trace: ExecutionTrace,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparedEvaluation {
    pub trace: ExecutionTrace,
    pub verdict: Verdict,
    pub regression: RegressionReport,
}

/// Runs cases through adapter, collector, scorer and, when given a baseline, the comparator.
///
/// Cheap to clone; clones share the HTTP connection pool and the judge.
#[derive(Debug, Clone)]
pub struct Evaluator {
    collector: TraceCollector,
    scorer: Scorer,
    settings: EvalSettings,
}

impl Evaluator {
    pub fn new(settings: EvalSettings) -> Result<Self, EvalError> {
        settings.validate()?;
        let collector = TraceCollector::new(settings.collector_config())?;
        let scorer = Scorer::new().with_judge_weight(settings.judge_weight);
        Ok(Self {
            collector,
            scorer,
            settings,
        })
    }

    pub fn with_judge(mut self, judge: Arc<dyn JudgeProvider>) -> Self {
        self.scorer = self.scorer.with_judge(judge, self.settings.judge_timeout);
        self
    }

    pub fn settings(&self) -> &EvalSettings {
        &self.settings
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Collect and score one case. `Err` only for configuration problems found before any I/O.
    pub async fn evaluate(&self, tc: &TestCase) -> Result<Evaluation, EvalError> {
        let adapter = tc.adapter.build(&tc.adapter_options);
        let trace = self.collector.run(adapter.as_ref(), tc).await?;
        let verdict = self.scorer.score(&trace, tc).await;
        info!(
            test_id = %tc.id,
            adapter = adapter.name(),
            terminal = %trace.terminal,
            elapsed_ms = trace.latency_ms,
            score = verdict.final_score,
            passed = verdict.passed,
            "case evaluated"
        );
        Ok(Evaluation { trace, verdict })
    }

    pub async fn evaluate_with_baseline(
        &self,
        tc: &TestCase,
        baseline: &BaselineEntry,
    ) -> Result<ComparedEvaluation, EvalError> {
        if baseline.test_id != tc.id {
            return Err(BaselineError::Mismatch {
                expected: tc.id.clone(),
                found: baseline.test_id.clone(),
            }
            .into());
        }
        let Evaluation { trace, verdict } = self.evaluate(tc).await?;
        let regression = baseline::compare(Snapshot::new(&trace, &verdict), baseline.snapshot());
        if regression.is_regression() {
            info!(
                test_id = %tc.id,
                new_failures = regression.new_failures.len(),
                score_delta = regression.score_delta,
                "regression against baseline"
            );
        }
        Ok(ComparedEvaluation {
            trace,
            verdict,
            regression,
        })
    }
}
