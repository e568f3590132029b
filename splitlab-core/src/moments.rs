//! Moment matching: build prior parameters from a target mean and variance.

use crate::distributions::{Beta, Family, Gamma, NormalGamma};
use crate::error::ModelError;

fn invalid(family: Family, mean: f64, variance: f64, reason: &'static str) -> ModelError {
    ModelError::InvalidMoment {
        family,
        mean,
        variance,
        reason,
    }
}

/// Beta distribution with the given mean and variance.
///
/// Requires `0 < mean < 1` and `0 < variance < mean * (1 - mean)`; a Beta
/// distribution cannot be wider than the Bernoulli with the same mean.
pub fn fit_beta(mean: f64, variance: f64) -> Result<Beta, ModelError> {
    let fam = Family::Beta;
    if !mean.is_finite() || mean <= 0.0 || mean >= 1.0 {
        return Err(invalid(fam, mean, variance, "mean must lie in (0, 1)"));
    }
    if !variance.is_finite() || variance <= 0.0 {
        return Err(invalid(fam, mean, variance, "variance must be > 0"));
    }
    if variance >= mean * (1.0 - mean) {
        return Err(invalid(fam, mean, variance, "variance must be < mean * (1 - mean)"));
    }

    let alpha = ((1.0 - mean) * mean * mean - mean * variance) / variance;
    let beta = alpha * (1.0 - mean) / mean;
    Beta::new(alpha, beta)
}

/// Gamma distribution (rate parameterisation) with the given mean and variance.
pub fn fit_gamma(mean: f64, variance: f64) -> Result<Gamma, ModelError> {
    let fam = Family::Gamma;
    if !mean.is_finite() || mean <= 0.0 {
        return Err(invalid(fam, mean, variance, "mean must be > 0"));
    }
    if !variance.is_finite() || variance <= 0.0 {
        return Err(invalid(fam, mean, variance, "variance must be > 0"));
    }

    let beta = mean / variance;
    let alpha = beta * mean;
    Gamma::new(alpha, beta)
}

/// Normal-Gamma distribution from:
/// - `mean0`: centre of the mean,
/// - `precision_mean`: expected precision,
/// - `var_of_mean`: marginal variance of the mean,
/// - `var_of_precision`: variance of the precision.
///
/// The marginal variance of the mean is `beta / (lambda * (alpha - 1))`, so the
/// fitted `alpha` must exceed 1.
pub fn fit_normal_gamma(
    mean0: f64,
    precision_mean: f64,
    var_of_mean: f64,
    var_of_precision: f64,
) -> Result<NormalGamma, ModelError> {
    let fam = Family::NormalGamma;
    if !mean0.is_finite() {
        return Err(invalid(fam, mean0, var_of_mean, "mean must be finite"));
    }
    if !var_of_mean.is_finite() || var_of_mean <= 0.0 {
        return Err(invalid(fam, mean0, var_of_mean, "variance of the mean must be > 0"));
    }
    let precision = fit_gamma(precision_mean, var_of_precision).map_err(|_| {
        invalid(
            fam,
            precision_mean,
            var_of_precision,
            "precision mean and variance must be > 0",
        )
    })?;

    if precision.alpha() <= 1.0 {
        return Err(invalid(
            fam,
            mean0,
            var_of_mean,
            "alpha <= 1 leaves the variance of the mean undefined",
        ));
    }

    let lambda = precision.beta() / (var_of_mean * (precision.alpha() - 1.0));
    NormalGamma::new(mean0, lambda, precision.alpha(), precision.beta())
}
