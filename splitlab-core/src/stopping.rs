//! Expected-loss stopping rule.
//!
//! State machine:
//!
//! ```text
//! Running ──(A qualifies for k rounds)──▶ StoppedA
//!    │    ──(B qualifies for k rounds)──▶ StoppedB
//!    └────(round >= max_rounds)────────▶ StoppedInconclusive
//! ```
//!
//! A variant qualifies on a round when its expected loss is below the threshold
//! and no larger than the other variant's (strictly smaller for B, so exact ties
//! go to A). `k` is `consecutive_rounds`; with the default of 1 the policy stops
//! the instant a variant qualifies. Terminal states are absorbing.

use serde::{Deserialize, Serialize};

use crate::distributions::Variant;
use crate::error::ModelError;
use crate::evaluator::LossPair;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopState {
    Running,
    StoppedA,
    StoppedB,
    StoppedInconclusive,
}

impl StopState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StopState::Running)
    }

    /// Winner declared by this state, if any.
    pub fn winner(&self) -> Option<Variant> {
        match self {
            StopState::StoppedA => Some(Variant::A),
            StopState::StoppedB => Some(Variant::B),
            StopState::Running | StopState::StoppedInconclusive => None,
        }
    }
}

/// Stopping policy for one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct StoppingPolicy {
    threshold: f64,
    max_rounds: u32,
    consecutive_rounds: u32,
    state: StopState,
    streak: Option<(Variant, u32)>,
}

impl StoppingPolicy {
    pub fn new(threshold: f64, max_rounds: u32, consecutive_rounds: u32) -> Result<Self, ModelError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ModelError::InvalidConfig(format!(
                "loss_threshold must be finite and > 0, got {threshold}"
            )));
        }
        if max_rounds == 0 {
            return Err(ModelError::InvalidConfig("max_rounds must be >= 1".into()));
        }
        if consecutive_rounds == 0 {
            return Err(ModelError::InvalidConfig(
                "consecutive_rounds must be >= 1".into(),
            ));
        }
        Ok(Self {
            threshold,
            max_rounds,
            consecutive_rounds,
            state: StopState::Running,
            streak: None,
        })
    }

    pub fn state(&self) -> StopState {
        self.state
    }

    /// Which variant, if any, qualifies on these losses alone.
    pub fn qualifying(&self, losses: &LossPair) -> Option<Variant> {
        if losses.loss_a < self.threshold && losses.loss_a <= losses.loss_b {
            Some(Variant::A)
        } else if losses.loss_b < self.threshold && losses.loss_b < losses.loss_a {
            Some(Variant::B)
        } else {
            None
        }
    }

    /// Feed the losses observed after `round` (1-based) and return the new state.
    pub fn observe(&mut self, losses: &LossPair, round: u32) -> StopState {
        if self.state.is_terminal() {
            return self.state;
        }

        self.streak = match (self.qualifying(losses), self.streak) {
            (Some(v), Some((prev, n))) if v == prev => Some((v, n + 1)),
            (Some(v), _) => Some((v, 1)),
            (None, _) => None,
        };

        self.state = match self.streak {
            Some((Variant::A, n)) if n >= self.consecutive_rounds => StopState::StoppedA,
            Some((Variant::B, n)) if n >= self.consecutive_rounds => StopState::StoppedB,
            _ if round >= self.max_rounds => StopState::StoppedInconclusive,
            _ => StopState::Running,
        };
        self.state
    }
}
