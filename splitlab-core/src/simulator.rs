//! One simulated experiment, end to end.
//!
//! Each round draws `obs_per_round / 2` observations per variant from the
//! trial's own seeded RNG, applies the conjugate update, evaluates both
//! expected losses, and feeds them to the stopping policy. Posterior state is
//! threaded through the loop as plain values; nothing is shared with other
//! trials, so a trial is a pure function of `(config, priors, seed)`.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Beta as BetaSampler, Binomial, Distribution, Gamma as GammaSampler, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{SamplingDistribution, SimulationConfig};
use crate::distributions::{PriorSpec, Variant, VariantPriors};
use crate::error::ModelError;
use crate::evaluator::{evaluate_losses, LossPair};
use crate::stopping::{StopState, StoppingPolicy};
use crate::update::{batch_moments, update_beta, update_normal_gamma};

/// Per-variant trial state. Replaced, not mutated, every round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariantState {
    pub posterior: PriorSpec,
    pub observations_seen: u64,
}

impl VariantState {
    pub fn new(prior: PriorSpec) -> Self {
        Self {
            posterior: prior,
            observations_seen: 0,
        }
    }
}

/// Outcome of one trial. Never mutated after `run_trial` returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub rounds_run: u32,
    pub stopped: bool,
    pub declared_winner: Option<Variant>,
    pub final_loss_a: f64,
    pub final_loss_b: f64,
    /// Variant whose simulated true rate/mean is higher (None on an exact tie).
    pub true_better: Option<Variant>,
    /// True regret of the chosen variant: the declared winner, or the variant
    /// with the smaller expected loss when the trial was inconclusive.
    pub realized_loss: f64,
}

impl TrialResult {
    /// Expected loss of the best choice at the final round.
    pub fn final_loss(&self) -> f64 {
        self.final_loss_a.min(self.final_loss_b)
    }
}

/// Ground truth drawn once per trial.
#[derive(Debug, Clone, Copy)]
enum Truth {
    Rates { a: f64, b: f64 },
    Gaussian { mean_a: f64, sd_a: f64, mean_b: f64, sd_b: f64 },
}

impl Truth {
    fn value(&self, variant: Variant) -> f64 {
        match (self, variant) {
            (Truth::Rates { a, .. }, Variant::A) => *a,
            (Truth::Rates { b, .. }, Variant::B) => *b,
            (Truth::Gaussian { mean_a, .. }, Variant::A) => *mean_a,
            (Truth::Gaussian { mean_b, .. }, Variant::B) => *mean_b,
        }
    }

    fn better(&self) -> Option<Variant> {
        let (a, b) = (self.value(Variant::A), self.value(Variant::B));
        if a > b {
            Some(Variant::A)
        } else if b > a {
            Some(Variant::B)
        } else {
            None
        }
    }

    fn regret(&self, chosen: Variant) -> f64 {
        (self.value(chosen.other()) - self.value(chosen)).max(0.0)
    }
}

fn sampler_error(e: impl std::fmt::Display) -> ModelError {
    ModelError::InvalidConfig(format!("sampling distribution: {e}"))
}

fn draw_truth(sampling: &SamplingDistribution, rng: &mut StdRng) -> Result<Truth, ModelError> {
    match sampling {
        SamplingDistribution::Bernoulli { rates } => {
            let dist = BetaSampler::new(rates.alpha(), rates.beta()).map_err(sampler_error)?;
            Ok(Truth::Rates {
                a: dist.sample(rng),
                b: dist.sample(rng),
            })
        }
        SamplingDistribution::FixedBernoulli { rate_a, rate_b } => Ok(Truth::Rates {
            a: *rate_a,
            b: *rate_b,
        }),
        SamplingDistribution::Gaussian { params } => {
            // rand_distr's Gamma takes a scale; ours carries a rate
            let precision =
                GammaSampler::new(params.alpha(), 1.0 / params.beta()).map_err(sampler_error)?;
            let mut draw = || -> Result<(f64, f64), ModelError> {
                let tau: f64 = precision.sample(rng);
                let mean_sd = 1.0 / (params.lambda() * tau).sqrt();
                let mean = Normal::new(params.mu0(), mean_sd)
                    .map_err(sampler_error)?
                    .sample(rng);
                Ok((mean, 1.0 / tau.sqrt()))
            };
            let (mean_a, sd_a) = draw()?;
            let (mean_b, sd_b) = draw()?;
            Ok(Truth::Gaussian {
                mean_a,
                sd_a,
                mean_b,
                sd_b,
            })
        }
    }
}

/// Draw one round of data for `variant` and return its updated state.
fn observe_round(
    state: &VariantState,
    variant: Variant,
    truth: &Truth,
    n: u64,
    rng: &mut StdRng,
) -> Result<VariantState, ModelError> {
    let posterior = match (&state.posterior, truth) {
        (PriorSpec::Beta(prior), Truth::Rates { .. }) => {
            let successes = Binomial::new(n, truth.value(variant))
                .map_err(sampler_error)?
                .sample(rng);
            PriorSpec::Beta(update_beta(prior, successes, n)?)
        }
        (PriorSpec::NormalGamma(prior), Truth::Gaussian { sd_a, sd_b, .. }) => {
            let sd = match variant {
                Variant::A => *sd_a,
                Variant::B => *sd_b,
            };
            let noise = Normal::new(truth.value(variant), sd).map_err(sampler_error)?;
            let batch: Vec<f64> = (0..n).map(|_| noise.sample(rng)).collect();
            let (mean, var) = batch_moments(&batch);
            PriorSpec::NormalGamma(update_normal_gamma(prior, mean, var, n)?)
        }
        (prior, _) => {
            return Err(ModelError::InvalidConfig(format!(
                "{:?} posterior cannot absorb this trial's observations",
                prior.family()
            )))
        }
    };
    Ok(VariantState {
        posterior,
        observations_seen: state.observations_seen + n,
    })
}

fn build_result(rounds_run: u32, state: StopState, losses: LossPair, truth: &Truth) -> TrialResult {
    let declared_winner = state.winner();
    let chosen = declared_winner.unwrap_or_else(|| losses.preferred());
    TrialResult {
        rounds_run,
        stopped: declared_winner.is_some(),
        declared_winner,
        final_loss_a: losses.loss_a,
        final_loss_b: losses.loss_b,
        true_better: truth.better(),
        realized_loss: truth.regret(chosen),
    }
}

/// Run one trial. Identical arguments give a bit-identical result.
pub fn run_trial(
    config: &SimulationConfig,
    priors: &VariantPriors,
    seed: u64,
) -> Result<TrialResult, ModelError> {
    config.validate()?;
    config.validate_priors(priors)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let truth = draw_truth(&config.sampling_distribution, &mut rng)?;
    let mut policy = StoppingPolicy::new(
        config.loss_threshold,
        config.max_rounds,
        config.consecutive_rounds,
    )?;

    let n = u64::from(config.obs_per_variant());
    let mut state_a = VariantState::new(priors.a);
    let mut state_b = VariantState::new(priors.b);

    for round in 1..=config.max_rounds {
        state_a = observe_round(&state_a, Variant::A, &truth, n, &mut rng)?;
        state_b = observe_round(&state_b, Variant::B, &truth, n, &mut rng)?;

        let losses = evaluate_losses(config.evaluation, &state_a.posterior, &state_b.posterior)?;
        let stop = policy.observe(&losses, round);
        if stop.is_terminal() {
            debug!(
                seed,
                round,
                state = ?stop,
                loss_a = losses.loss_a,
                loss_b = losses.loss_b,
                observations = state_a.observations_seen + state_b.observations_seen,
                "trial finished"
            );
            return Ok(build_result(round, stop, losses, &truth));
        }
    }

    // The policy turns terminal at max_rounds, and validate() rejects max_rounds == 0
    Err(ModelError::InvalidConfig("max_rounds must be >= 1".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::{Beta, NormalGamma};

    fn beta_priors(alpha: f64, beta: f64) -> VariantPriors {
        VariantPriors::shared(PriorSpec::Beta(Beta::new(alpha, beta).unwrap()))
    }

    fn fixed_config(rate_a: f64, rate_b: f64) -> SimulationConfig {
        SimulationConfig {
            num_trials: 1,
            loss_threshold: 1e-3,
            sampling_distribution: SamplingDistribution::FixedBernoulli { rate_a, rate_b },
            obs_per_round: 200,
            max_rounds: 500,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn same_seed_same_result() {
        let config = fixed_config(0.1, 0.12);
        let priors = beta_priors(1.0, 1.0);
        let r1 = run_trial(&config, &priors, 99).unwrap();
        let r2 = run_trial(&config, &priors, 99).unwrap();
        assert_eq!(r1, r2);
        assert_eq!(r1.final_loss_a.to_bits(), r2.final_loss_a.to_bits());
    }

    #[test]
    fn clear_winner_is_found() {
        let config = fixed_config(0.05, 0.30);
        let result = run_trial(&config, &beta_priors(1.0, 1.0), 7).unwrap();
        assert!(result.stopped);
        assert_eq!(result.declared_winner, Some(Variant::B));
        assert_eq!(result.true_better, Some(Variant::B));
        assert_eq!(result.realized_loss, 0.0);
        assert!(result.final_loss_b < config.loss_threshold);
    }

    #[test]
    fn unreachable_threshold_in_one_round_is_inconclusive() {
        let config = SimulationConfig {
            loss_threshold: 1e-12,
            max_rounds: 1,
            ..fixed_config(0.1, 0.1)
        };
        let result = run_trial(&config, &beta_priors(1.0, 1.0), 3).unwrap();
        assert_eq!(result.rounds_run, 1);
        assert!(!result.stopped);
        assert_eq!(result.declared_winner, None);
    }

    #[test]
    fn rounds_never_exceed_max() {
        let config = SimulationConfig {
            loss_threshold: 1e-9,
            max_rounds: 5,
            ..fixed_config(0.5, 0.5)
        };
        let result = run_trial(&config, &beta_priors(1.0, 1.0), 11).unwrap();
        assert_eq!(result.rounds_run, 5);
        assert!(!result.stopped);
    }

    #[test]
    fn odd_obs_per_round_fails_the_trial() {
        let config = SimulationConfig {
            obs_per_round: 3,
            ..fixed_config(0.1, 0.2)
        };
        assert!(matches!(
            run_trial(&config, &beta_priors(1.0, 1.0), 1),
            Err(ModelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn mismatched_priors_fail_the_trial() {
        let config = fixed_config(0.1, 0.2);
        let priors = VariantPriors::shared(PriorSpec::NormalGamma(
            NormalGamma::new(0.0, 1.0, 2.0, 2.0).unwrap(),
        ));
        assert!(run_trial(&config, &priors, 1).is_err());
    }

    #[test]
    fn fractional_prior_needs_numerical_method() {
        let config = fixed_config(0.1, 0.2);
        let priors = beta_priors(1.5, 1.0);
        assert!(matches!(
            run_trial(&config, &priors, 1),
            Err(ModelError::UnsupportedShape { .. })
        ));
    }

    #[test]
    fn gaussian_trial_runs() {
        let params = NormalGamma::new(0.0, 1.0, 20.0, 20.0).unwrap();
        let config = SimulationConfig {
            num_trials: 1,
            loss_threshold: 0.05,
            sampling_distribution: SamplingDistribution::Gaussian { params },
            obs_per_round: 40,
            max_rounds: 200,
            ..SimulationConfig::default()
        };
        let priors = VariantPriors::shared(PriorSpec::NormalGamma(params));
        let r1 = run_trial(&config, &priors, 5).unwrap();
        let r2 = run_trial(&config, &priors, 5).unwrap();
        assert_eq!(r1, r2);
        assert!(r1.rounds_run <= 200);
        assert!(r1.final_loss_a >= 0.0 && r1.final_loss_b >= 0.0);
        if !r1.stopped {
            assert_eq!(r1.declared_winner, None);
        }
    }
}
