//! Deterministic RNG hierarchy.
//!
//! A master seed generates a sub-seed for every `(config_id, trial)` pair via
//! BLAKE3, independently of thread scheduling, so results are identical
//! regardless of thread count or completion order.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Sub-seed for one trial of one configuration.
    pub fn trial_seed(&self, config_id: &str, trial: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(config_id.as_bytes());
        hasher.update(&trial.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Seeded StdRng for one trial.
    pub fn rng_for(&self, config_id: &str, trial: u64) -> StdRng {
        StdRng::seed_from_u64(self.trial_seed(config_id, trial))
    }
}
