//! Conjugate posterior updates. Pure functions: the prior is never modified.

use crate::distributions::{Beta, NormalGamma};
use crate::error::ModelError;

/// Beta-Bernoulli update: `Beta(alpha + successes, beta + trials - successes)`.
pub fn update_beta(prior: &Beta, successes: u64, trials: u64) -> Result<Beta, ModelError> {
    if successes > trials {
        return Err(ModelError::InvalidObservation(format!(
            "{successes} successes out of {trials} trials"
        )));
    }
    Beta::new(
        prior.alpha() + successes as f64,
        prior.beta() + (trials - successes) as f64,
    )
}

/// Normal-Gamma update from a batch of `n` Gaussian draws.
///
/// `sample_var` is the biased (divide-by-n) variance of the batch. An empty
/// batch returns the prior unchanged.
pub fn update_normal_gamma(
    prior: &NormalGamma,
    sample_mean: f64,
    sample_var: f64,
    n: u64,
) -> Result<NormalGamma, ModelError> {
    if n == 0 {
        return Ok(*prior);
    }
    if !sample_mean.is_finite() {
        return Err(ModelError::InvalidObservation(format!(
            "sample mean {sample_mean} is not finite"
        )));
    }
    if !sample_var.is_finite() || sample_var < 0.0 {
        return Err(ModelError::InvalidObservation(format!(
            "sample variance {sample_var} must be finite and >= 0"
        )));
    }

    let n_f = n as f64;
    let lambda = prior.lambda() + n_f;
    let mu0 = (prior.lambda() * prior.mu0() + n_f * sample_mean) / lambda;
    let alpha = prior.alpha() + n_f / 2.0;
    let shift = sample_mean - prior.mu0();
    let beta = prior.beta()
        + 0.5 * (n_f * sample_var + prior.lambda() * n_f * shift * shift / lambda);

    NormalGamma::new(mu0, lambda, alpha, beta)
}

/// Mean and biased variance of a batch, in one pass (Welford).
pub fn batch_moments(values: &[f64]) -> (f64, f64) {
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for (i, &x) in values.iter().enumerate() {
        let delta = x - mean;
        mean += delta / (i + 1) as f64;
        m2 += delta * (x - mean);
    }
    if values.is_empty() {
        (0.0, 0.0)
    } else {
        (mean, m2 / values.len() as f64)
    }
}
