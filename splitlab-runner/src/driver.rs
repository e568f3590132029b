//! Experiment driver: runs many trials of many configurations in parallel.
//!
//! Every (configuration, trial) pair is an independent task whose seed comes
//! from `RngHierarchy::trial_seed(config_id, trial)`. Tasks are flattened into
//! one rayon work list, and results are regrouped by configuration index, so
//! aggregates are identical for any thread count or completion order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use splitlab_core::{run_trial, RngHierarchy, SimulationConfig, VariantPriors};

use crate::aggregate::{AggregateResult, TrialOutcome};

/// One configuration to simulate, with the priors both variants start from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSpec {
    pub label: String,
    pub config: SimulationConfig,
    pub priors: VariantPriors,
}

impl ExperimentSpec {
    /// Content hash of the configuration and priors (BLAKE3 of canonical JSON).
    ///
    /// The label is excluded: two identically configured experiments share
    /// trial seeds whatever they are called.
    pub fn config_id(&self) -> String {
        let json = serde_json::to_string(&(&self.config, &self.priors))
            .expect("experiment serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

/// Driver-level knobs that do not change what a trial computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverOptions {
    pub master_seed: u64,
    /// Size of a private rayon pool; `None` uses the global pool.
    pub threads: Option<usize>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            master_seed: 42,
            threads: None,
        }
    }
}

fn build_pool(threads: Option<usize>) -> Option<rayon::ThreadPool> {
    let threads = threads?;
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!(threads, error = %e, "failed to build private thread pool, using global pool");
            None
        }
    }
}

/// Run every trial of every experiment and reduce per experiment.
///
/// Returns one `AggregateResult` per experiment, in input order. A failing
/// trial is counted in `failed_trials` and never aborts its siblings. When
/// `cancel` is set, trials that have not started yet are counted as skipped.
pub fn run_configurations(
    experiments: &[ExperimentSpec],
    options: &DriverOptions,
    cancel: Option<&AtomicBool>,
) -> Vec<AggregateResult> {
    let started = Instant::now();
    let hierarchy = RngHierarchy::new(options.master_seed);
    let ids: Vec<String> = experiments.iter().map(ExperimentSpec::config_id).collect();

    let tasks: Vec<(usize, u64)> = experiments
        .iter()
        .enumerate()
        .flat_map(|(idx, e)| (0..e.config.num_trials as u64).map(move |trial| (idx, trial)))
        .collect();

    info!(
        experiments = experiments.len(),
        tasks = tasks.len(),
        master_seed = options.master_seed,
        threads = ?options.threads,
        "starting simulation"
    );

    let run_task = |&(idx, trial): &(usize, u64)| -> TrialOutcome {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return TrialOutcome::Skipped;
        }
        let experiment = &experiments[idx];
        let seed = hierarchy.trial_seed(&ids[idx], trial);
        match run_trial(&experiment.config, &experiment.priors, seed) {
            Ok(result) => TrialOutcome::Completed(result),
            Err(e) => {
                debug!(label = %experiment.label, trial, error = %e, "trial failed");
                TrialOutcome::Failed(e)
            }
        }
    };

    let outcomes: Vec<TrialOutcome> = match build_pool(options.threads) {
        Some(pool) => pool.install(|| tasks.par_iter().map(run_task).collect()),
        None => tasks.par_iter().map(run_task).collect(),
    };

    let mut grouped: Vec<Vec<TrialOutcome>> = experiments
        .iter()
        .map(|e| Vec::with_capacity(e.config.num_trials))
        .collect();
    for (&(idx, _), outcome) in tasks.iter().zip(outcomes) {
        grouped[idx].push(outcome);
    }

    let results: Vec<AggregateResult> = experiments
        .iter()
        .zip(ids)
        .zip(grouped)
        .map(|((experiment, id), outcomes)| {
            let agg = AggregateResult::from_outcomes(
                id,
                experiment.label.clone(),
                experiment.config.loss_threshold,
                &outcomes,
            );
            if agg.failed_trials > 0 {
                let first_error = outcomes.iter().find_map(|o| match o {
                    TrialOutcome::Failed(e) => Some(e.to_string()),
                    _ => None,
                });
                warn!(
                    label = %agg.label,
                    failed = agg.failed_trials,
                    first_error = first_error.as_deref().unwrap_or(""),
                    "trials failed"
                );
            }
            info!(
                label = %agg.label,
                trials = agg.trials,
                skipped = agg.skipped_trials,
                mean_loss = agg.mean_loss,
                stop_rate = agg.stop_rate,
                mean_rounds = agg.mean_rounds,
                "configuration done"
            );
            agg
        })
        .collect();

    info!(elapsed_ms = started.elapsed().as_millis() as u64, "simulation finished");
    results
}

/// One experiment per threshold, otherwise identical to `base`.
pub fn threshold_sweep(base: &ExperimentSpec, thresholds: &[f64]) -> Vec<ExperimentSpec> {
    thresholds
        .iter()
        .map(|&threshold| ExperimentSpec {
            label: format!("{}@{threshold:e}", base.label),
            config: SimulationConfig {
                loss_threshold: threshold,
                ..base.config.clone()
            },
            priors: base.priors,
        })
        .collect()
}
