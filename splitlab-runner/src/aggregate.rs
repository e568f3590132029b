//! Per-configuration reduction of trial results.

use serde::{Deserialize, Serialize};

use splitlab_core::{ModelError, TrialResult, Variant};

/// What happened to one scheduled trial.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    Completed(TrialResult),
    Failed(ModelError),
    /// Not started because the run was cancelled.
    Skipped,
}

/// Summary of every trial of one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub config_id: String,
    pub label: String,
    pub loss_threshold: f64,

    /// Trials that completed.
    pub trials: usize,
    pub failed_trials: usize,
    pub skipped_trials: usize,

    /// Mean over completed trials of `min(final_loss_a, final_loss_b)`,
    /// taken at the stopping round or at `max_rounds`.
    pub mean_loss: f64,
    /// Fraction of completed trials that declared a winner.
    pub stop_rate: f64,
    pub mean_rounds: f64,

    /// Mean true regret of the chosen variant.
    pub mean_realized_loss: f64,
    /// Mean final min-loss over stopped trials only; `None` if none stopped.
    pub mean_stopped_min_loss: Option<f64>,

    pub wins_a: usize,
    pub wins_b: usize,

    /// Percentiles of the final min-loss distribution.
    pub loss_p50: f64,
    pub loss_p95: f64,
}

impl AggregateResult {
    /// Reduce the outcomes of one configuration. Order of `outcomes` is the
    /// trial index order, so the reduction is deterministic.
    pub fn from_outcomes(
        config_id: impl Into<String>,
        label: impl Into<String>,
        loss_threshold: f64,
        outcomes: &[TrialOutcome],
    ) -> Self {
        let mut completed: Vec<&TrialResult> = Vec::with_capacity(outcomes.len());
        let mut failed_trials = 0;
        let mut skipped_trials = 0;
        for outcome in outcomes {
            match outcome {
                TrialOutcome::Completed(r) => completed.push(r),
                TrialOutcome::Failed(_) => failed_trials += 1,
                TrialOutcome::Skipped => skipped_trials += 1,
            }
        }

        let trials = completed.len();
        let losses: Vec<f64> = completed.iter().map(|r| r.final_loss()).collect();
        let stopped: Vec<f64> = completed
            .iter()
            .filter(|r| r.stopped)
            .map(|r| r.final_loss())
            .collect();

        let wins = |v: Variant| {
            completed
                .iter()
                .filter(|r| r.declared_winner == Some(v))
                .count()
        };

        let mut sorted = losses.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Self {
            config_id: config_id.into(),
            label: label.into(),
            loss_threshold,
            trials,
            failed_trials,
            skipped_trials,
            mean_loss: mean(&losses),
            stop_rate: if trials == 0 {
                0.0
            } else {
                stopped.len() as f64 / trials as f64
            },
            mean_rounds: mean(
                &completed
                    .iter()
                    .map(|r| f64::from(r.rounds_run))
                    .collect::<Vec<_>>(),
            ),
            mean_realized_loss: mean(
                &completed.iter().map(|r| r.realized_loss).collect::<Vec<_>>(),
            ),
            mean_stopped_min_loss: if stopped.is_empty() {
                None
            } else {
                Some(mean(&stopped))
            },
            wins_a: wins(Variant::A),
            wins_b: wins(Variant::B),
            loss_p50: percentile_sorted(&sorted, 50.0),
            loss_p95: percentile_sorted(&sorted, 95.0),
        }
    }

    /// Completed + failed + skipped.
    pub fn scheduled_trials(&self) -> usize {
        self.trials + self.failed_trials + self.skipped_trials
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Linear-interpolated percentile of an ascending slice.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}
