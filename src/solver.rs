//! External hydrological solver boundary.
//!
//! The solver is an external simulation engine consuming a declarative run
//! configuration plus a working directory and producing timestep-indexed
//! gridded output files. This module models only that interface: an
//! immutable `SolverConfig` assembled stage by stage through a builder
//! (each stage returns a new value instead of mutating a shared
//! configuration tree), a `Solver` trait, and a subprocess-backed
//! implementation.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RunError;
use crate::flux::IrrigationForcing;

/// Flux forcing attachment for the solver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcingConfig {
    /// Forcing file name (or series base name) inside the working directory.
    pub file_name: String,

    /// Whether the forcing is a per-timestep transient series rather than a
    /// single static file.
    pub transient: bool,
}

/// Resolved solver run configuration for one simulated year.
///
/// Immutable once built; a JSON snapshot is written into the run directory
/// for provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Declared stop time in solver time units.
    pub stop_time: u64,

    /// Interval between output dumps.
    pub dump_interval: u64,

    /// Starting timestep counter.
    pub start_count: u64,

    /// Process-grid topology (P, Q).
    pub topology: (usize, usize),

    /// Initial-condition pressure field, inherited from the previous year's
    /// terminal state. None for the first year of a sequence (the base
    /// input's default initial condition applies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_pressure_file: Option<PathBuf>,

    /// Anthropogenic withdrawal forcing. None when the year pumps nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forcing: Option<ForcingConfig>,

    /// Land-surface irrigation parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irrigation: Option<IrrigationForcing>,
}

impl SolverConfig {
    /// Starts a builder with the mandatory timing envelope.
    #[must_use]
    pub fn builder(stop_time: u64, dump_interval: u64, topology: (usize, usize)) -> SolverConfigBuilder {
        SolverConfigBuilder {
            config: Self {
                stop_time,
                dump_interval,
                start_count: 0,
                topology,
                initial_pressure_file: None,
                forcing: None,
                irrigation: None,
            },
        }
    }

    /// Writes the configuration snapshot into `dir` via write-then-rename.
    ///
    /// # Errors
    ///
    /// `RunError::Io` on any write failure.
    pub fn write_snapshot(&self, dir: &Path) -> Result<PathBuf, RunError> {
        let path = dir.join("solver_config.json");
        let temp = dir.join(format!("solver_config.json.tmp.{}", Uuid::new_v4()));
        let text = serde_json::to_string_pretty(self).map_err(|e| {
            RunError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        fs::write(&temp, text).map_err(|e| RunError::io(&temp, e))?;
        fs::rename(&temp, &path).map_err(|e| RunError::io(&path, e))?;
        Ok(path)
    }
}

/// Stage-by-stage builder for `SolverConfig`.
#[derive(Debug, Clone)]
pub struct SolverConfigBuilder {
    config: SolverConfig,
}

impl SolverConfigBuilder {
    /// Sets the starting timestep counter.
    #[must_use]
    pub fn start_count(mut self, start_count: u64) -> Self {
        self.config.start_count = start_count;
        self
    }

    /// Points the initial-condition pressure field at a terminal-state file.
    #[must_use]
    pub fn initial_pressure(mut self, path: PathBuf) -> Self {
        self.config.initial_pressure_file = Some(path);
        self
    }

    /// Attaches withdrawal forcing.
    #[must_use]
    pub fn forcing(mut self, file_name: impl Into<String>, transient: bool) -> Self {
        self.config.forcing = Some(ForcingConfig {
            file_name: file_name.into(),
            transient,
        });
        self
    }

    /// Attaches irrigation forcing parameters.
    #[must_use]
    pub fn irrigation(mut self, irrigation: IrrigationForcing) -> Self {
        self.config.irrigation = Some(irrigation);
        self
    }

    /// Finalizes the configuration.
    #[must_use]
    pub fn build(self) -> SolverConfig {
        self.config
    }
}

/// The external solver invocation boundary.
///
/// Implementations run synchronously; the solver's own run duration bounds
/// the call. Internal parallelization across the P x Q process grid is the
/// solver's concern, not this crate's.
pub trait Solver {
    /// Runs one simulated year in `workdir` under `config`.
    ///
    /// # Errors
    ///
    /// `RunError::SolverExecution` when the solver reports failure.
    fn run(&self, config: &SolverConfig, workdir: &Path) -> Result<(), RunError>;
}

/// Subprocess-backed solver: invokes a configured executable with the
/// working directory and the config snapshot path as arguments.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    executable: PathBuf,
}

impl CommandSolver {
    /// Creates a solver invoking `executable`.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

impl Solver for CommandSolver {
    fn run(&self, config: &SolverConfig, workdir: &Path) -> Result<(), RunError> {
        let config_path = config.write_snapshot(workdir)?;
        let run_name = workdir
            .file_name()
            .map_or_else(|| workdir.display().to_string(), |n| n.to_string_lossy().into_owned());

        let status = Command::new(&self.executable)
            .arg("--config")
            .arg(&config_path)
            .current_dir(workdir)
            .status()
            .map_err(|e| RunError::io(&self.executable, e))?;

        if !status.success() {
            return Err(RunError::SolverExecution {
                run: run_name,
                reason: format!("exit status {status}"),
            });
        }
        Ok(())
    }
}
