//! Error kinds shared by the fitters, kernel, evaluator, updater, and simulator.

use thiserror::Error;

use crate::distributions::Family;

/// Errors from the statistical core.
///
/// None of these are retried. A failing trial is reported to the driver, which
/// counts it and keeps going with the sibling trials.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("invalid {family:?} parameter {name} = {value} (must be finite and > 0)")]
    InvalidParameter {
        family: Family,
        name: &'static str,
        value: f64,
    },

    #[error("no {family:?} distribution has mean {mean} and variance {variance}: {reason}")]
    InvalidMoment {
        family: Family,
        mean: f64,
        variance: f64,
        reason: &'static str,
    },

    #[error("invalid observation: {0}")]
    InvalidObservation(String),

    #[error("closed-form sum needs an integral shape parameter, got {alpha}")]
    UnsupportedShape { alpha: f64 },

    #[error("expected loss undefined for Normal-Gamma with alpha = {alpha} (needs alpha > 0.5)")]
    UndefinedExpectation { alpha: f64 },

    #[error("numeric instability in {context}: {value}")]
    NumericInstability { context: &'static str, value: f64 },

    #[error("posterior family mismatch: {a:?} vs {b:?}")]
    FamilyMismatch { a: Family, b: Family },

    #[error("invalid simulation config: {0}")]
    InvalidConfig(String),
}
