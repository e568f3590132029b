//! SplitLab Runner — experiment orchestration on top of `splitlab-core`.
//!
//! This crate provides:
//! - Parallel, deterministic execution of many trials across many configurations
//! - Per-configuration aggregation (mean loss, stop rate, rounds, regret)
//! - Threshold sweeps and TOML experiment plans

pub mod aggregate;
pub mod driver;
pub mod plan;

pub use aggregate::{AggregateResult, TrialOutcome};
pub use driver::{run_configurations, threshold_sweep, DriverOptions, ExperimentSpec};
pub use plan::{ExperimentPlan, PlanEntry, PlanError};
