//! Pipeline configuration.
//!
//! Every stage receives the [`PipelineConfig`] explicitly. Defaults are the
//! values of the production mod-5 run; a JSON file may override any subset.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CongruenceError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// The prime p of the mod-p representations.
    pub p: u64,
    pub min_conductor: u64,
    pub max_conductor: u64,
    pub hash: HashConfig,
    pub kraus: KrausConfig,
    pub star_zero: StarZeroConfig,
    /// Use the backend's optimised representation of kernel fields.
    pub optimize_kernel_fields: bool,
    /// Use the backend's optimised representation of star fields.
    pub optimize_star_fields: bool,
    /// Where stage artifacts are saved; `None` disables checkpoints.
    pub checkpoint_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashConfig {
    /// Sample primes start strictly after this value.
    pub start_after: u64,
    pub prime_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KrausConfig {
    pub bound_cap: u64,
    /// Cap used when verifying irreducible groups.
    pub irreducible_bound_cap: u64,
    /// Replace the pair by a minimal quadratic twist before testing.
    pub twist: bool,
    /// A twisted second curve above this conductor is reverted.
    pub twist_conductor_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarZeroConfig {
    pub start_prime_count: usize,
    /// The heuristic doubles its prime count while strictly below this.
    pub prime_count_cap: usize,
    /// Decide inconclusive curves with the p-torsion field degree.
    pub exact_fallback: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            p: 5,
            min_conductor: 11,
            max_conductor: 500_000,
            hash: HashConfig::default(),
            kraus: KrausConfig::default(),
            star_zero: StarZeroConfig::default(),
            optimize_kernel_fields: true,
            optimize_star_fields: false,
            checkpoint_dir: Some(PathBuf::from("IntermediateFiles")),
            output_dir: PathBuf::from("PairsLists"),
        }
    }
}

impl Default for HashConfig {
    fn default() -> Self {
        HashConfig {
            start_after: 400_000,
            prime_count: 50,
        }
    }
}

impl Default for KrausConfig {
    fn default() -> Self {
        KrausConfig {
            bound_cap: 5_000_000,
            irreducible_bound_cap: 10_000_000,
            twist: true,
            twist_conductor_limit: 400_000,
        }
    }
}

impl Default for StarZeroConfig {
    fn default() -> Self {
        StarZeroConfig {
            start_prime_count: 50,
            prime_count_cap: 1000,
            exact_fallback: true,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if congruence_core::fricke_polynomial(self.p).is_none() {
            return Err(CongruenceError::UnsupportedPrime(self.p));
        }
        if self.min_conductor == 0 || self.min_conductor > self.max_conductor {
            return Err(CongruenceError::Config(format!(
                "empty conductor range {}..={}",
                self.min_conductor, self.max_conductor
            )));
        }
        if self.hash.prime_count == 0 {
            return Err(CongruenceError::Config(
                "hash.prime_count must be positive".to_string(),
            ));
        }
        if self.star_zero.start_prime_count == 0 {
            return Err(CongruenceError::Config(
                "star_zero.start_prime_count must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Checkpoint key of a stage artifact, e.g. `mod5_hashtable`.
    pub fn checkpoint_key(&self, stage: &str) -> String {
        format!("mod{}_{}", self.p, stage)
    }

    pub fn irreducible_output(&self) -> PathBuf {
        self.output_dir.join(format!("pairs_mod{}_irred.m", self.p))
    }

    pub fn reducible_output(&self) -> PathBuf {
        self.output_dir.join(format!("pairs_mod{}_red.m", self.p))
    }
}
