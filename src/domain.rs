//! Static per-domain context.
//!
//! `DomainState` carries everything the run-sequence engine needs to know
//! about one watershed: directory layout, process-grid topology, vertical
//! discretization, the simulated-year timing envelope, and the per-domain
//! flux policy. It is built once from a configuration file and read-only
//! thereafter; every executor and runner operation borrows it.
//!
//! The flux policy replaces what used to be process-wide globals and three
//! divergent per-watershed pumping modules: classifier keys, pumping layer,
//! and withdrawal multipliers all live here as explicit values.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fingerprint::SequenceFingerprint;
use crate::scenario::Wetness;

/// Simulated hours in one full water year (hourly timesteps).
pub const HOURS_PER_YEAR: u64 = 8760;

/// Shortened stop time used in testing mode: one simulated day.
pub const TESTING_STOP_TIME: u64 = 24;

/// Per-domain flux-derivation policy.
///
/// Defaults match the empirical values used across the original watershed
/// variants; individual domains override them in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluxPolicy {
    /// Vertical layer receiving the withdrawal flux. A near-surface layer
    /// distinct from the deepest layer (wells sit ~30 m down).
    pub pumping_layer: usize,

    /// Land-cover columns whose positive sum marks irrigated cropland.
    pub classifier_columns: Vec<String>,

    /// Gross withdrawal multiplier when irrigation is enabled. Irrigation
    /// surface losses inflate gross pumping above consumptive use.
    pub irrigation_gross_rate: f64,

    /// Withdrawal multiplier when irrigation is disabled: without efficiency
    /// losses, effective pumping is ~70% of gross.
    pub no_irrigation_derate: f64,

    /// Nominal per-cell consumptive-use rate at full pumping fraction.
    pub nominal_rate: f64,
}

impl Default for FluxPolicy {
    fn default() -> Self {
        Self {
            pumping_layer: 2,
            classifier_columns: vec!["12".to_string(), "14".to_string()],
            irrigation_gross_rate: 1.3,
            no_irrigation_derate: 0.7,
            nominal_rate: 1.0,
        }
    }
}

/// Declarative domain configuration, read once per domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Domain (watershed) name; names the domain directory.
    pub name: String,

    /// Hydrologic-unit identifier handed to the provisioning service.
    pub huc_id: String,

    /// Historical water year seeding the dry base inputs.
    pub dry_year: i32,

    /// Historical water year seeding the average base inputs.
    pub average_year: i32,

    /// Historical water year seeding the wet base inputs.
    pub wet_year: i32,

    /// Process-grid columns for the solver's domain decomposition.
    pub p: usize,

    /// Process-grid rows for the solver's domain decomposition.
    pub q: usize,

    /// Vertical layer thicknesses, bottom to top.
    pub dz: Vec<f64>,

    /// Testing mode: one simulated day instead of a full year.
    #[serde(default)]
    pub testing: bool,

    /// Per-domain flux policy overrides.
    #[serde(default)]
    pub flux_policy: FluxPolicy,
}

impl DomainConfig {
    /// Reads a domain configuration file (JSON).
    ///
    /// # Errors
    ///
    /// `ConfigError::Malformed` when the file cannot be read or parsed;
    /// `ConfigError::MissingField` when `dz` is empty.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::MissingField {
                field: "name".to_string(),
            });
        }
        if self.dz.is_empty() {
            return Err(ConfigError::MissingField {
                field: "dz".to_string(),
            });
        }
        Ok(())
    }

    /// The historical water year for a wetness class.
    #[must_use]
    pub const fn year_for(&self, wetness: Wetness) -> i32 {
        match wetness {
            Wetness::Dry => self.dry_year,
            Wetness::Average => self.average_year,
            Wetness::Wet => self.wet_year,
        }
    }
}

/// Resolved, immutable per-domain state.
///
/// Owned by the orchestration layer and passed by reference into every
/// executor and runner operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainState {
    config: DomainConfig,
    directory: PathBuf,
    stop_time: u64,
    dump_interval: u64,
}

impl DomainState {
    /// Builds domain state from configuration and a project root.
    ///
    /// The domain directory is `project_root/domains/<name>` (with a
    /// `testing` subdirectory in testing mode so short runs never collide
    /// with production caches).
    #[must_use]
    pub fn from_config(config: DomainConfig, project_root: &Path) -> Self {
        let mut directory = project_root.join("domains").join(&config.name);
        if config.testing {
            directory = directory.join("testing");
        }
        let stop_time = if config.testing {
            TESTING_STOP_TIME
        } else {
            HOURS_PER_YEAR
        };
        Self {
            config,
            directory,
            stop_time,
            dump_interval: 1,
        }
    }

    /// The underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &DomainConfig {
        &self.config
    }

    /// Domain name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Root directory for this domain's inputs and runs.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Directory holding the canonical wetness-class base inputs.
    #[must_use]
    pub fn inputs_directory(&self) -> PathBuf {
        self.directory.join("inputs")
    }

    /// Base-input directory for one wetness class.
    #[must_use]
    pub fn base_input_dir(&self, wetness: Wetness) -> PathBuf {
        self.inputs_directory()
            .join(format!("{}_{}", self.config.name, wetness))
    }

    /// Whether a wetness class's base inputs have been materialized.
    #[must_use]
    pub fn base_inputs_exist(&self, wetness: Wetness) -> bool {
        self.base_input_dir(wetness).exists()
    }

    /// Directory holding identity-addressed run outputs.
    #[must_use]
    pub fn runs_dir(&self) -> PathBuf {
        self.directory.join("runs")
    }

    /// Output directory for one fingerprinted sequence prefix.
    #[must_use]
    pub fn run_dir(&self, fingerprint: &SequenceFingerprint) -> PathBuf {
        self.runs_dir().join(fingerprint.to_hex())
    }

    /// Declared stop time for one simulated year, in solver time units.
    #[must_use]
    pub const fn stop_time(&self) -> u64 {
        self.stop_time
    }

    /// Interval between solver output dumps.
    #[must_use]
    pub const fn dump_interval(&self) -> u64 {
        self.dump_interval
    }

    /// Number of timestep-indexed output files the solver produces per year.
    #[must_use]
    pub const fn num_output_files(&self) -> u64 {
        self.stop_time / self.dump_interval
    }

    /// Process-grid topology (P, Q).
    #[must_use]
    pub const fn topology(&self) -> (usize, usize) {
        (self.config.p, self.config.q)
    }

    /// Vertical layer thicknesses.
    #[must_use]
    pub fn dz(&self) -> &[f64] {
        &self.config.dz
    }

    /// Per-domain flux policy.
    #[must_use]
    pub const fn flux_policy(&self) -> &FluxPolicy {
        &self.config.flux_policy
    }

    /// Testing mode flag.
    #[must_use]
    pub const fn is_testing(&self) -> bool {
        self.config.testing
    }
}
