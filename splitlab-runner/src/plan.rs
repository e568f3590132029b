//! TOML experiment plans.
//!
//! A plan is a list of `[[experiment]]` tables plus driver options:
//!
//! ```toml
//! master_seed = 7
//! threads = 4
//!
//! [[experiment]]
//! label = "baseline"
//! thresholds = [1e-3, 1e-4]   # optional: expands into one experiment per value
//!
//! [experiment.config]
//! num_trials = 250
//! loss_threshold = 1e-4
//! obs_per_round = 500
//! max_rounds = 10000
//! sampling_distribution = { type = "BERNOULLI", rates = { alpha = 70.0, beta = 7000.0 } }
//!
//! [experiment.priors]
//! a = { family = "beta", alpha = 70.0, beta = 7000.0 }
//! b = { family = "beta", alpha = 70.0, beta = 7000.0 }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use splitlab_core::{ModelError, SimulationConfig, VariantPriors};

use crate::driver::{threshold_sweep, DriverOptions, ExperimentSpec};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("read plan file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse plan TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("plan has no experiments")]
    Empty,

    #[error("experiment '{label}': {source}")]
    Invalid {
        label: String,
        #[source]
        source: ModelError,
    },

    #[error("threads must be >= 1")]
    ZeroThreads,
}

/// One `[[experiment]]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub label: String,
    pub config: SimulationConfig,
    pub priors: VariantPriors,
    /// When present, the entry expands into a threshold sweep and
    /// `config.loss_threshold` is ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Vec<f64>>,
}

impl PlanEntry {
    fn into_specs(self) -> Vec<ExperimentSpec> {
        let base = ExperimentSpec {
            label: self.label,
            config: self.config,
            priors: self.priors,
        };
        match self.thresholds {
            Some(thresholds) => threshold_sweep(&base, &thresholds),
            None => vec![base],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(rename = "experiment", default)]
    pub experiments: Vec<PlanEntry>,
}

fn default_master_seed() -> u64 {
    DriverOptions::default().master_seed
}

impl ExperimentPlan {
    /// Load a plan from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a plan from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, PlanError> {
        Ok(toml::from_str(content)?)
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            master_seed: self.master_seed,
            threads: self.threads,
        }
    }

    /// Expand sweeps and validate every experiment.
    pub fn experiments(&self) -> Result<Vec<ExperimentSpec>, PlanError> {
        if self.experiments.is_empty() {
            return Err(PlanError::Empty);
        }
        if self.threads == Some(0) {
            return Err(PlanError::ZeroThreads);
        }
        let specs: Vec<ExperimentSpec> = self
            .experiments
            .iter()
            .cloned()
            .flat_map(PlanEntry::into_specs)
            .collect();
        for spec in &specs {
            let invalid = |source| PlanError::Invalid {
                label: spec.label.clone(),
                source,
            };
            spec.config.validate().map_err(invalid)?;
            spec.config.validate_priors(&spec.priors).map_err(invalid)?;
        }
        Ok(specs)
    }
}
