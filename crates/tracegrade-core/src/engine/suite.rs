use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::{ComparedEvaluation, Evaluation, Evaluator};
use crate::baseline::{BaselineEntry, BaselineError, BaselineStore};
use crate::errors::EvalError;
use crate::model::TestCase;
use crate::report::{BaselineStatus, CaseOutcome, SuiteReport};

#[derive(Debug, Clone, Default)]
pub struct SuiteOptions {
    pub baseline_store: Option<BaselineStore>,
    /// Compare each case against its stored baseline.
    pub compare: bool,
    /// Store every successfully collected run as the new baseline once all cases finish. A
    /// failed write marks that case `SaveFailed` and the remaining saves still run.
    pub save_baseline: bool,
}

impl Evaluator {
    /// Run cases on a bounded pool. One case failing, erroring or panicking never stops the
    /// others. Baselines are written only after every case has finished.
    pub async fn run_suite(
        &self,
        cases: Vec<TestCase>,
        options: &SuiteOptions,
    ) -> Result<SuiteReport, EvalError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let started = Instant::now();

        if (options.compare || options.save_baseline) && options.baseline_store.is_none() {
            return Err(EvalError::config(
                "baseline comparison or saving requested without a baseline directory",
            ));
        }

        let parallel = self.settings.parallel.max(1);
        info!(run_id = %run_id, cases = cases.len(), parallel, "starting suite");

        let sem = Arc::new(Semaphore::new(parallel));
        let mut join_set = JoinSet::new();
        let mut pending: Vec<(String, crate::adapter::AdapterKind)> = Vec::new();

        for tc in cases {
            let permit = sem
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| EvalError::config(format!("worker pool closed: {}", e)))?;
            pending.push((tc.id.clone(), tc.adapter));
            let this = self.clone();
            let store = if options.compare {
                options.baseline_store.clone()
            } else {
                None
            };
            join_set.spawn(async move {
                let _permit = permit;
                run_case(&this, &tc, store.as_ref()).await
            });
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(run_id = %run_id, error = %e, "case task failed"),
            }
        }

        // Tasks that panicked or were cancelled leave no outcome behind.
        let finished: BTreeSet<String> = outcomes.iter().map(|o| o.test_id.clone()).collect();
        for (id, adapter) in pending {
            if !finished.contains(&id) {
                outcomes.push(CaseOutcome::errored(id, adapter, "case task failed to complete"));
            }
        }

        if options.save_baseline {
            if let Some(store) = &options.baseline_store {
                save_baselines(store, &mut outcomes).await;
            }
        }

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let report = SuiteReport::new(run_id, started_at, duration_ms, outcomes);
        info!(
            run_id = %report.run_id,
            passed = report.summary.passed,
            failed = report.summary.failed,
            errored = report.summary.errored,
            regressions = report.summary.regressions,
            elapsed_ms = duration_ms,
            "suite finished"
        );
        Ok(report)
    }
}

async fn run_case(evaluator: &Evaluator, tc: &TestCase, store: Option<&BaselineStore>) -> CaseOutcome {
    let baseline = match store {
        Some(store) => match load_blocking(store, &tc.id).await {
            Ok(b) => b,
            Err(e) => return CaseOutcome::errored(&tc.id, tc.adapter, e.to_string()),
        },
        None => None,
    };

    match baseline {
        Some(entry) => match evaluator.evaluate_with_baseline(tc, &entry).await {
            Ok(ComparedEvaluation {
                trace,
                verdict,
                regression,
            }) => CaseOutcome::evaluated(
                &tc.id,
                tc.adapter,
                trace,
                verdict,
                Some(regression),
                BaselineStatus::Compared,
            ),
            Err(e) => CaseOutcome::errored(&tc.id, tc.adapter, e.to_string()),
        },
        None => {
            let status = if store.is_some() {
                BaselineStatus::Missing
            } else {
                BaselineStatus::NotRequested
            };
            match evaluator.evaluate(tc).await {
                Ok(Evaluation { trace, verdict }) => {
                    CaseOutcome::evaluated(&tc.id, tc.adapter, trace, verdict, None, status)
                }
                Err(e) => CaseOutcome::errored(&tc.id, tc.adapter, e.to_string()),
            }
        }
    }
}

/// Runs whose backend exchange did not end cleanly are not stored as golden runs.
async fn save_baselines(store: &BaselineStore, outcomes: &mut [CaseOutcome]) {
    for outcome in outcomes.iter_mut() {
        let (Some(trace), Some(verdict)) = (&outcome.trace, &outcome.verdict) else {
            continue;
        };
        if !trace.terminal.is_ok() {
            warn!(
                test_id = %outcome.test_id,
                terminal = %trace.terminal,
                "not saving baseline for incomplete run"
            );
            continue;
        }
        let entry = BaselineEntry::new(outcome.test_id.clone(), trace.clone(), verdict.clone());
        match save_blocking(store, entry).await {
            Ok(_) => outcome.baseline = BaselineStatus::Saved,
            Err(e) => {
                warn!(test_id = %outcome.test_id, error = %e, "baseline not saved");
                outcome.baseline = BaselineStatus::SaveFailed;
                outcome.error = Some(format!("baseline not saved: {}", e));
            }
        }
    }
}

// The store does blocking file IO and takes an OS file lock.
async fn load_blocking(
    store: &BaselineStore,
    test_id: &str,
) -> Result<Option<BaselineEntry>, BaselineError> {
    let (store, id) = (store.clone(), test_id.to_string());
    let path = store.path_for(test_id);
    tokio::task::spawn_blocking(move || store.load(&id))
        .await
        .map_err(|e| join_failed(path, e))?
}

async fn save_blocking(
    store: &BaselineStore,
    entry: BaselineEntry,
) -> Result<std::path::PathBuf, BaselineError> {
    let store = store.clone();
    let path = store.path_for(&entry.test_id);
    tokio::task::spawn_blocking(move || store.save(&entry))
        .await
        .map_err(|e| join_failed(path, e))?
}

fn join_failed(path: std::path::PathBuf, e: tokio::task::JoinError) -> BaselineError {
    BaselineError::Io {
        path,
        source: std::io::Error::other(e),
    }
}
