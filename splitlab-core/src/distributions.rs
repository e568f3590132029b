//! Conjugate distribution values: Beta, Gamma, and Normal-Gamma.
//!
//! Every instance is validated on construction (including deserialization), so
//! `alpha`, `beta`, and `lambda` are finite and strictly positive for as long as
//! the value exists. Values are `Copy` and never mutated; the updater returns new
//! ones.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Distribution family tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Beta,
    Gamma,
    NormalGamma,
}

/// One of the two arms of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variant {
    A,
    B,
}

impl Variant {
    pub fn other(self) -> Self {
        match self {
            Variant::A => Variant::B,
            Variant::B => Variant::A,
        }
    }
}

fn check_positive(family: Family, name: &'static str, value: f64) -> Result<f64, ModelError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ModelError::InvalidParameter {
            family,
            name,
            value,
        })
    }
}

// ─── Beta ────────────────────────────────────────────────────────────

/// Beta(alpha, beta): prior/posterior for a Bernoulli rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBeta")]
pub struct Beta {
    alpha: f64,
    beta: f64,
}

#[derive(Deserialize)]
struct RawBeta {
    alpha: f64,
    beta: f64,
}

impl TryFrom<RawBeta> for Beta {
    type Error = ModelError;

    fn try_from(raw: RawBeta) -> Result<Self, Self::Error> {
        Beta::new(raw.alpha, raw.beta)
    }
}

impl Beta {
    pub fn new(alpha: f64, beta: f64) -> Result<Self, ModelError> {
        Ok(Self {
            alpha: check_positive(Family::Beta, "alpha", alpha)?,
            beta: check_positive(Family::Beta, "beta", beta)?,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    pub fn variance(&self) -> f64 {
        let s = self.alpha + self.beta;
        self.alpha * self.beta / (s * s * (s + 1.0))
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

// ─── Gamma ───────────────────────────────────────────────────────────

/// Gamma(alpha, beta) with rate `beta`: prior for a Poisson rate or a
/// Gaussian precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGamma")]
pub struct Gamma {
    alpha: f64,
    beta: f64,
}

#[derive(Deserialize)]
struct RawGamma {
    alpha: f64,
    beta: f64,
}

impl TryFrom<RawGamma> for Gamma {
    type Error = ModelError;

    fn try_from(raw: RawGamma) -> Result<Self, Self::Error> {
        Gamma::new(raw.alpha, raw.beta)
    }
}

impl Gamma {
    pub fn new(alpha: f64, beta: f64) -> Result<Self, ModelError> {
        Ok(Self {
            alpha: check_positive(Family::Gamma, "alpha", alpha)?,
            beta: check_positive(Family::Gamma, "beta", beta)?,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn mean(&self) -> f64 {
        self.alpha / self.beta
    }

    pub fn variance(&self) -> f64 {
        self.alpha / (self.beta * self.beta)
    }
}

// ─── Normal-Gamma ────────────────────────────────────────────────────

/// NormalGamma(mu0, lambda, alpha, beta): joint prior/posterior over a Gaussian
/// mean and precision.
///
/// precision ~ Gamma(alpha, beta), mean | precision ~ Normal(mu0, 1 / (lambda * precision)).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNormalGamma")]
pub struct NormalGamma {
    mu0: f64,
    lambda: f64,
    alpha: f64,
    beta: f64,
}

#[derive(Deserialize)]
struct RawNormalGamma {
    mu0: f64,
    lambda: f64,
    alpha: f64,
    beta: f64,
}

impl TryFrom<RawNormalGamma> for NormalGamma {
    type Error = ModelError;

    fn try_from(raw: RawNormalGamma) -> Result<Self, Self::Error> {
        NormalGamma::new(raw.mu0, raw.lambda, raw.alpha, raw.beta)
    }
}

impl NormalGamma {
    pub fn new(mu0: f64, lambda: f64, alpha: f64, beta: f64) -> Result<Self, ModelError> {
        if !mu0.is_finite() {
            return Err(ModelError::InvalidParameter {
                family: Family::NormalGamma,
                name: "mu0",
                value: mu0,
            });
        }
        Ok(Self {
            mu0,
            lambda: check_positive(Family::NormalGamma, "lambda", lambda)?,
            alpha: check_positive(Family::NormalGamma, "alpha", alpha)?,
            beta: check_positive(Family::NormalGamma, "beta", beta)?,
        })
    }

    pub fn mu0(&self) -> f64 {
        self.mu0
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Marginal distribution of the precision.
    pub fn precision(&self) -> Gamma {
        Gamma {
            alpha: self.alpha,
            beta: self.beta,
        }
    }

    /// Variance of the marginal (Student-t) distribution of the mean.
    /// Infinite when `alpha <= 1`.
    pub fn variance_of_mean(&self) -> f64 {
        if self.alpha <= 1.0 {
            return f64::INFINITY;
        }
        self.beta / (self.lambda * (self.alpha - 1.0))
    }

    /// Degrees of freedom of the marginal Student-t over the mean.
    pub fn mean_dof(&self) -> f64 {
        2.0 * self.alpha
    }

    /// Scale of the marginal Student-t over the mean.
    pub fn mean_scale(&self) -> f64 {
        (self.beta / (self.alpha * self.lambda)).sqrt()
    }
}

// ─── Prior specification ─────────────────────────────────────────────

/// A distribution family tag plus its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum PriorSpec {
    Beta(Beta),
    Gamma(Gamma),
    NormalGamma(NormalGamma),
}

impl PriorSpec {
    pub fn family(&self) -> Family {
        match self {
            PriorSpec::Beta(_) => Family::Beta,
            PriorSpec::Gamma(_) => Family::Gamma,
            PriorSpec::NormalGamma(_) => Family::NormalGamma,
        }
    }
}

/// Priors for both arms of one experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariantPriors {
    pub a: PriorSpec,
    pub b: PriorSpec,
}

impl VariantPriors {
    /// The same prior for both arms.
    pub fn shared(prior: PriorSpec) -> Self {
        Self { a: prior, b: prior }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beta_rejects_non_positive() {
        assert!(Beta::new(0.0, 1.0).is_err());
        assert!(Beta::new(1.0, -2.0).is_err());
        assert!(Beta::new(f64::NAN, 1.0).is_err());
        assert!(Beta::new(f64::INFINITY, 1.0).is_err());
    }

    #[test]
    fn beta_moments() {
        let b = Beta::new(2.0, 6.0).unwrap();
        assert!((b.mean() - 0.25).abs() < 1e-12);
        // 2*6 / (64 * 9)
        assert!((b.variance() - 12.0 / 576.0).abs() < 1e-12);
    }

    #[test]
    fn gamma_moments() {
        let g = Gamma::new(3.0, 2.0).unwrap();
        assert!((g.mean() - 1.5).abs() < 1e-12);
        assert!((g.variance() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn normal_gamma_rejects_bad_mu0() {
        assert!(NormalGamma::new(f64::NAN, 1.0, 2.0, 2.0).is_err());
        assert!(NormalGamma::new(0.0, 0.0, 2.0, 2.0).is_err());
    }

    #[test]
    fn normal_gamma_variance_of_mean_undefined_below_one() {
        let ng = NormalGamma::new(0.0, 1.0, 0.8, 1.0).unwrap();
        assert!(ng.variance_of_mean().is_infinite());
    }

    #[test]
    fn deserialize_validates() {
        let ok: Result<Beta, _> = serde_json::from_str(r#"{"alpha": 2.0, "beta": 3.0}"#);
        assert!(ok.is_ok());
        let bad: Result<Beta, _> = serde_json::from_str(r#"{"alpha": -2.0, "beta": 3.0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn prior_spec_tagged_json() {
        let spec = PriorSpec::Beta(Beta::new(70.0, 7000.0).unwrap());
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains(r#""family":"beta""#), "{json}");
        let back: PriorSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
        assert_eq!(back.family(), Family::Beta);
    }

    #[test]
    fn variant_other() {
        assert_eq!(Variant::A.other(), Variant::B);
        assert_eq!(Variant::B.other(), Variant::A);
    }
}
