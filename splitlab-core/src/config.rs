//! Serializable simulation configuration.

use serde::{Deserialize, Serialize};

use crate::distributions::{Beta, NormalGamma, PriorSpec, VariantPriors};
use crate::error::ModelError;
use crate::evaluator::EvaluationMethod;

/// Where the synthetic observations of a trial come from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SamplingDistribution {
    /// Each trial draws the true conversion rate of A and of B independently
    /// from `rates`, then observes Bernoulli outcomes.
    Bernoulli { rates: Beta },

    /// Fixed true conversion rates.
    FixedBernoulli { rate_a: f64, rate_b: f64 },

    /// Each trial draws a true (mean, precision) per variant from `params`,
    /// then observes Gaussian outcomes.
    Gaussian { params: NormalGamma },
}

impl SamplingDistribution {
    fn needs_beta_priors(&self) -> bool {
        matches!(
            self,
            SamplingDistribution::Bernoulli { .. } | SamplingDistribution::FixedBernoulli { .. }
        )
    }
}

/// Parameters of one simulated configuration. Immutable during a driver run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of independent trials.
    pub num_trials: usize,

    /// Stop once a variant's expected loss drops below this.
    pub loss_threshold: f64,

    pub sampling_distribution: SamplingDistribution,

    /// Observations per round across both variants. Must be even and >= 2;
    /// odd values are rejected rather than rounded.
    pub obs_per_round: u32,

    /// Hard cap on rounds per trial.
    pub max_rounds: u32,

    /// Comparison method for Beta posteriors.
    #[serde(default)]
    pub evaluation: EvaluationMethod,

    /// Rounds in a row a variant must qualify before the trial stops.
    #[serde(default = "default_consecutive_rounds")]
    pub consecutive_rounds: u32,
}

fn default_consecutive_rounds() -> u32 {
    1
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_trials: 250,
            loss_threshold: 1e-4,
            sampling_distribution: SamplingDistribution::Bernoulli {
                rates: Beta::new(70.0, 7000.0).expect("constant Beta parameters are valid"),
            },
            obs_per_round: 500,
            max_rounds: 10_000,
            evaluation: EvaluationMethod::ClosedForm,
            consecutive_rounds: 1,
        }
    }
}

impl SimulationConfig {
    /// Observations each variant receives per round.
    pub fn obs_per_variant(&self) -> u32 {
        self.obs_per_round / 2
    }

    /// Check every field-level invariant.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.num_trials == 0 {
            return Err(ModelError::InvalidConfig("num_trials must be >= 1".into()));
        }
        if !self.loss_threshold.is_finite() || self.loss_threshold <= 0.0 {
            return Err(ModelError::InvalidConfig(format!(
                "loss_threshold must be finite and > 0, got {}",
                self.loss_threshold
            )));
        }
        if self.obs_per_round < 2 || self.obs_per_round % 2 != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "obs_per_round must be an even number >= 2, got {}",
                self.obs_per_round
            )));
        }
        if self.max_rounds == 0 {
            return Err(ModelError::InvalidConfig("max_rounds must be >= 1".into()));
        }
        if self.consecutive_rounds == 0 {
            return Err(ModelError::InvalidConfig(
                "consecutive_rounds must be >= 1".into(),
            ));
        }
        if let SamplingDistribution::FixedBernoulli { rate_a, rate_b } = self.sampling_distribution
        {
            for rate in [rate_a, rate_b] {
                if !(0.0..=1.0).contains(&rate) {
                    return Err(ModelError::InvalidConfig(format!(
                        "fixed Bernoulli rate {rate} is outside [0, 1]"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Check that the priors belong to the family the sampling distribution feeds.
    pub fn validate_priors(&self, priors: &VariantPriors) -> Result<(), ModelError> {
        for prior in [&priors.a, &priors.b] {
            let ok = match prior {
                PriorSpec::Beta(_) => self.sampling_distribution.needs_beta_priors(),
                PriorSpec::NormalGamma(_) => !self.sampling_distribution.needs_beta_priors(),
                PriorSpec::Gamma(_) => false,
            };
            if !ok {
                return Err(ModelError::InvalidConfig(format!(
                    "{:?} prior cannot be updated from {:?} observations",
                    prior.family(),
                    self.sampling_distribution
                )));
            }
        }
        Ok(())
    }
}
