//! SplitLab Core — Bayesian A/B decision engine.
//!
//! This crate contains the statistical heart of the simulator:
//! - Conjugate distribution values (Beta, Gamma, Normal-Gamma) and moment fitting
//! - Log-space special functions and the closed-form comparison sum
//! - P(B > A) and expected loss for Beta and Normal-Gamma posteriors
//! - Conjugate updates, the expected-loss stopping policy, and the per-trial simulator
//! - Deterministic per-trial RNG derivation

pub mod config;
pub mod distributions;
pub mod error;
pub mod evaluator;
pub mod moments;
pub mod rng;
pub mod simulator;
pub mod special;
pub mod stopping;
pub mod update;

pub use config::{SamplingDistribution, SimulationConfig};
pub use distributions::{Beta, Family, Gamma, NormalGamma, PriorSpec, Variant, VariantPriors};
pub use error::ModelError;
pub use evaluator::{
    evaluate_losses, evaluate_probability, expected_loss, expected_loss_numeric,
    normal_gamma_expected_loss, normal_gamma_probability_b_greater_a, probability_b_greater_a,
    probability_b_greater_a_numeric, EvaluationMethod, LossPair,
};
pub use moments::{fit_beta, fit_gamma, fit_normal_gamma};
pub use rng::RngHierarchy;
pub use simulator::{run_trial, TrialResult, VariantState};
pub use special::{h_sum, ln_beta, ln_gamma, Shape};
pub use stopping::{StopState, StoppingPolicy};
pub use update::{update_beta, update_normal_gamma};
