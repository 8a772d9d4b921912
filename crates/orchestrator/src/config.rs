//! Configuration parsing and validation for migration runs.

use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

use kernel::{ConfigurationError, GlobalDomain, Periodicity};

/// Failure to obtain a usable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid JSON for [`SimulationConfig`].
    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// The parsed values are out of range.
    #[error(transparent)]
    Invalid(#[from] ConfigurationError),
}

/// Main run configuration.
///
/// Every field has a default, so `{}` is a valid config file: one step of
/// 10000 particles in a periodic 100-unit box, grid shape chosen
/// automatically for the available workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of steps to run.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
    /// Total number of particles across all workers.
    #[serde(default = "default_total_particles")]
    pub total_particles: u64,
    /// Edge lengths of the global box, per axis.
    #[serde(default = "default_system_size")]
    pub system_size: [f64; 3],
    /// Lower corner of the global box, per axis.
    #[serde(default = "default_system_offset")]
    pub system_offset: [f64; 3],
    /// Grid cells per axis; a zero component is filled automatically from
    /// the worker count.
    #[serde(default)]
    pub grid_shape: [usize; 3],
    /// Per-axis periodic boundary flags.
    #[serde(default = "default_periodicity")]
    pub periodicity: Periodicity,
    /// Global random seed; per-worker seeds are derived from it.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Per-axis bound on the random-walk displacement per step.
    #[serde(default = "default_max_displacement")]
    pub max_displacement: f64,
    /// Base name for XYZ snapshot output; `None` disables the writer.
    #[serde(default)]
    pub output_name: Option<String>,
    /// Steps between snapshots; `0` disables the writer as well.
    #[serde(default = "default_write_interval")]
    pub write_interval: u64,
    /// Number of workers to spawn.  Workers beyond the grid-cell count
    /// stay idle.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

// Default values
fn default_max_steps() -> u64 {
    1
}

fn default_total_particles() -> u64 {
    10_000
}

fn default_system_size() -> [f64; 3] {
    [100.0; 3]
}

fn default_system_offset() -> [f64; 3] {
    [-50.0; 3]
}

fn default_periodicity() -> Periodicity {
    [true; 3]
}

fn default_seed() -> u64 {
    1
}

fn default_max_displacement() -> f64 {
    1.0
}

fn default_write_interval() -> u64 {
    1
}

fn default_workers() -> usize {
    1
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            total_particles: default_total_particles(),
            system_size: default_system_size(),
            system_offset: default_system_offset(),
            grid_shape: [0; 3],
            periodicity: default_periodicity(),
            seed: default_seed(),
            max_displacement: default_max_displacement(),
            output_name: None,
            write_interval: default_write_interval(),
            workers: default_workers(),
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_string(), source })?;
        let config: SimulationConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// The global box described by size and offset.
    pub fn domain(&self) -> Result<GlobalDomain, ConfigurationError> {
        let min = self.system_offset;
        let mut max = [0.0; 3];
        for axis in 0..3 {
            max[axis] = min[axis] + self.system_size[axis];
        }
        GlobalDomain::new(min, max)
    }

    /// Validate the configuration.
    ///
    /// Grid-dependent checks (worker count, displacement bound) happen at
    /// bootstrap, once the grid shape is known.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.domain()?;
        Ok(())
    }
}
