//! Optimizer configuration.
//!
//! Every field has a default, so a YAML document only needs the keys it overrides:
//! ```yaml
//! max-fixpoint-iterations: 20
//! physical:
//!   max-frames-for-join: 256
//! ```
use std::fs::File;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::OptResult;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OptimizerConfig {
    /// Upper bound of sweeps for a fixpoint rule controller.
    pub max_fixpoint_iterations: usize,
    /// Upper bound of consecutive redundant order removals on one slot.
    pub max_sort_elimination_cascade: usize,
    pub physical: PhysicalOptimizationConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_fixpoint_iterations: 100,
            max_sort_elimination_cascade: 64,
            physical: PhysicalOptimizationConfig::default(),
        }
    }
}

impl OptimizerConfig {
    pub fn from_yaml_str(yaml: &str) -> OptResult<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse optimizer config")
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> OptResult<Self> {
        let file = File::open(path.as_ref()).with_context(|| {
            format!("Failed to open optimizer config: {:?}", path.as_ref())
        })?;
        serde_yaml::from_reader(file).with_context(|| {
            format!("Failed to parse optimizer config: {:?}", path.as_ref())
        })
    }
}

/// Memory budgets, all expressed in frames of `frame_size` bytes.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PhysicalOptimizationConfig {
    pub frame_size: u64,
    /// Memory of an external sort. A sort whose whole input fits is done in memory.
    pub max_frames_external_sort: u64,
    /// Memory budget of a join's build side.
    pub max_frames_for_join: u64,
    pub hash_join_fudge_factor: f64,
}

impl Default for PhysicalOptimizationConfig {
    fn default() -> Self {
        Self {
            frame_size: 32768,
            max_frames_external_sort: 4096,
            max_frames_for_join: 4096,
            hash_join_fudge_factor: 1.3,
        }
    }
}

impl PhysicalOptimizationConfig {
    /// Number of frames needed to hold `bytes`.
    pub fn frames_for(&self, bytes: u64) -> u64 {
        if self.frame_size == 0 {
            return bytes;
        }
        bytes.div_ceil(self.frame_size)
    }

    /// Whether an input of `frames` frames can be sorted without spilling.
    pub fn fits_sort_memory(&self, frames: u64) -> bool {
        frames <= self.max_frames_external_sort
    }

    /// Whether a build side of `frames` frames fits the join memory budget.
    pub fn fits_join_memory(&self, frames: u64) -> bool {
        (frames as f64) * self.hash_join_fudge_factor <= self.max_frames_for_join as f64
    }
}
