use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::LboError;
use crate::pipeline::{run_scenario, ScenarioInput, ScenarioOutput};
use crate::LboResult;

/// Cooperative cancellation flag shared between the caller and the workers.
///
/// Checked before each scenario is dispatched; a scenario already running is
/// allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Worker threads; rayon's default (one per core) when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum ScenarioStatus {
    Completed { output: Box<ScenarioOutput> },
    Failed { kind: String, message: String },
    Cancelled,
}

impl ScenarioStatus {
    pub fn output(&self) -> Option<&ScenarioOutput> {
        match self {
            ScenarioStatus::Completed { output } => Some(output.as_ref()),
            _ => None,
        }
    }

    fn from_error(err: &LboError) -> Self {
        ScenarioStatus::Failed {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub index: usize,
    pub name: String,
    #[serde(flatten)]
    pub status: ScenarioStatus,
}

/// Per-scenario results in input order, with outcome counts.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: Vec<ScenarioResult>,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

pub(crate) fn build_pool(config: &RunnerConfig) -> LboResult<rayon::ThreadPool> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = config.threads {
        if threads == 0 {
            return Err(LboError::InvalidInput {
                field: "threads".into(),
                reason: "Thread count must be at least 1".into(),
            });
        }
        builder = builder.num_threads(threads);
    }
    builder.build().map_err(|e| LboError::InvalidInput {
        field: "threads".into(),
        reason: format!("Cannot build worker pool: {e}"),
    })
}

/// Evaluate independent scenarios on a worker pool.
///
/// One scenario's failure never affects its siblings. Results are returned in
/// input order regardless of completion order.
pub fn run_batch(
    inputs: &[ScenarioInput],
    config: &RunnerConfig,
    token: &CancellationToken,
) -> LboResult<BatchReport> {
    run_batch_with_progress(inputs, config, token, |_| {})
}

/// [`run_batch`] with a callback invoked on the worker thread as each
/// scenario settles. Callers use it to report progress or to cancel the
/// remainder of the batch through `token`.
pub fn run_batch_with_progress<F>(
    inputs: &[ScenarioInput],
    config: &RunnerConfig,
    token: &CancellationToken,
    on_result: F,
) -> LboResult<BatchReport>
where
    F: Fn(&ScenarioResult) + Sync,
{
    let pool = build_pool(config)?;
    info!(
        scenarios = inputs.len(),
        threads = pool.current_num_threads(),
        "starting scenario batch"
    );

    let results: Vec<ScenarioResult> = pool.install(|| {
        inputs
            .par_iter()
            .enumerate()
            .map(|(index, input)| {
                let status = if token.is_cancelled() {
                    ScenarioStatus::Cancelled
                } else {
                    match run_scenario(input) {
                        Ok(output) => ScenarioStatus::Completed {
                            output: Box::new(output),
                        },
                        Err(e) => {
                            warn!(index, scenario = %input.name, error = %e, "scenario failed");
                            ScenarioStatus::from_error(&e)
                        }
                    }
                };
                let result = ScenarioResult {
                    index,
                    name: input.name.clone(),
                    status,
                };
                on_result(&result);
                result
            })
            .collect()
    });

    let count = |pred: fn(&ScenarioStatus) -> bool| {
        results.iter().filter(|r| pred(&r.status)).count()
    };
    let completed = count(|s| matches!(s, ScenarioStatus::Completed { .. }));
    let failed = count(|s| matches!(s, ScenarioStatus::Failed { .. }));
    let cancelled = count(|s| matches!(s, ScenarioStatus::Cancelled));
    info!(completed, failed, cancelled, "scenario batch finished");

    Ok(BatchReport {
        results,
        completed,
        failed,
        cancelled,
    })
}
