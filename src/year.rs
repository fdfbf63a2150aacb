//! Single-year execution.
//!
//! A `YearRun` is one executed (or pending) simulation year: a sequence
//! prefix, its fingerprint, and the identity-addressed run directory
//! `domain/runs/<fingerprint-hex>`. `YearExecutor` drives one year through
//! `PREPARE -> CONFIGURE_FORCING -> EXECUTE -> PERSIST`.
//!
//! # Completion marking
//!
//! Directory existence alone is never trusted as a cache hit: a process
//! killed mid-EXECUTE leaves a directory behind. Completion is an atomic
//! sentinel (`complete.json`, written via temp-then-rename) recording the
//! terminal-state file name and its blake3 checksum. A directory without a
//! sentinel is `InProgress` and surfaces as cache corruption when a walk
//! encounters it; operators inspect or clear it manually.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::DomainState;
use crate::error::{DroughtError, RunError};
use crate::fingerprint::{self, SequenceFingerprint};
use crate::flux::{FluxFieldBuilder, FluxMode, FluxSchedule};
use crate::grid::{GridReader, GridWriter};
use crate::landcover::LandCoverTable;
use crate::scenario::ScenarioYear;
use crate::solver::{Solver, SolverConfig};

/// Domain mask grid file inside a run directory.
pub const MASK_FILE: &str = "mask.pfb";

/// Land-cover classification table inside a run directory.
pub const VEGM_FILE: &str = "drv_vegm.dat";

/// Default vegetation-parameter table.
pub const VEGP_FILE: &str = "drv_vegp.dat";

/// Irrigation-specific vegetation-parameter table.
pub const VEGP_IRRIGATION_FILE: &str = "drv_vegp_for_irrigation.dat";

/// Provenance record of the prefix that produced a run directory.
pub const SEQUENCE_FILE: &str = "sequence.json";

/// Snapshot of the domain configuration in effect when the year ran.
pub const CONFIG_SNAPSHOT_FILE: &str = "config_at_time_of_run.json";

/// Completion sentinel file name.
pub const SENTINEL_FILE: &str = "complete.json";

/// Static / duty-cycle "on" flux grid file.
pub const FLUX_ON_FILE: &str = "fluxes_on.pfb";

/// Duty-cycle "off" flux grid file.
pub const FLUX_OFF_FILE: &str = "fluxes_off.pfb";

/// Terminal-state file name for a year: the solver's final-timestep pressure
/// output, zero-padded to five digits.
#[must_use]
pub fn terminal_file_name(num_output_files: u64) -> String {
    format!("run.out.press.{num_output_files:05}.pfb")
}

/// Per-timestep flux file name.
#[must_use]
pub fn flux_step_file_name(timestep: u64) -> String {
    format!("fluxes.{timestep:05}.pfb")
}

/// Observed lifecycle state of a year's run directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No output directory exists; the year has not been attempted.
    Pending,
    /// The directory exists but carries no completion sentinel: either a
    /// concurrent process is executing it, or a previous attempt died.
    InProgress,
    /// Sentinel present and the terminal-state file it names exists.
    Complete,
}

/// Atomic completion marker written after a successful year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSentinel {
    /// Terminal-state file name (relative to the run directory).
    pub terminal_file: String,

    /// blake3 checksum of the terminal-state file, hex-encoded.
    pub checksum: String,

    /// When the year finished.
    pub completed_at: DateTime<Utc>,
}

impl CompletionSentinel {
    /// Builds a sentinel for an existing terminal-state file.
    ///
    /// # Errors
    ///
    /// `RunError::Io` if the terminal file cannot be read for checksumming.
    pub fn for_terminal_file(path: &Path) -> Result<Self, RunError> {
        let bytes = fs::read(path).map_err(|e| RunError::io(path, e))?;
        let checksum = blake3::hash(&bytes).to_hex().to_string();
        let terminal_file = path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        Ok(Self {
            terminal_file,
            checksum,
            completed_at: Utc::now(),
        })
    }

    /// Writes the sentinel into `dir` via write-then-rename.
    ///
    /// # Errors
    ///
    /// `RunError::Io` on any write failure.
    pub fn write(&self, dir: &Path) -> Result<(), RunError> {
        let path = dir.join(SENTINEL_FILE);
        let temp = dir.join(format!("{SENTINEL_FILE}.tmp.{}", Uuid::new_v4()));
        let text = serde_json::to_string_pretty(self).map_err(|e| {
            RunError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        fs::write(&temp, text).map_err(|e| RunError::io(&temp, e))?;
        fs::rename(&temp, &path).map_err(|e| RunError::io(&path, e))?;
        Ok(())
    }

    /// Reads the sentinel from `dir`, if present.
    ///
    /// # Errors
    ///
    /// `RunError::CacheCorruption` when the sentinel exists but does not
    /// parse.
    pub fn read(dir: &Path) -> Result<Option<Self>, RunError> {
        let path = dir.join(SENTINEL_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RunError::io(&path, e)),
        };
        let sentinel = serde_json::from_str(&text).map_err(|e| RunError::CacheCorruption {
            run: dir.display().to_string(),
            reason: format!("unreadable completion sentinel: {e}"),
        })?;
        Ok(Some(sentinel))
    }
}

/// One executed (or pending) simulation year.
#[derive(Debug, Clone)]
pub struct YearRun {
    prefix: Vec<ScenarioYear>,
    fingerprint: SequenceFingerprint,
    run_dir: PathBuf,
}

impl YearRun {
    /// Constructs the run for a sequence prefix.
    ///
    /// # Panics
    ///
    /// Panics on an empty prefix; `ScenarioSequence` guarantees non-empty
    /// prefixes.
    #[must_use]
    pub fn new(domain: &DomainState, prefix: &[ScenarioYear]) -> Self {
        assert!(!prefix.is_empty(), "a year run needs at least one year");
        let fingerprint = fingerprint::fingerprint(prefix);
        let run_dir = domain.run_dir(&fingerprint);
        Self {
            prefix: prefix.to_vec(),
            fingerprint,
            run_dir,
        }
    }

    /// The fingerprint identifying this prefix.
    #[must_use]
    pub const fn fingerprint(&self) -> &SequenceFingerprint {
        &self.fingerprint
    }

    /// The identity-addressed output directory.
    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// The prefix this run covers.
    #[must_use]
    pub fn prefix(&self) -> &[ScenarioYear] {
        &self.prefix
    }

    /// This run's scenario year (the last element of the prefix).
    #[must_use]
    pub fn scenario_year(&self) -> &ScenarioYear {
        self.prefix.last().expect("prefix is non-empty")
    }

    /// Expected terminal-state file path for this run.
    #[must_use]
    pub fn terminal_pressure_path(&self, domain: &DomainState) -> PathBuf {
        self.run_dir.join(terminal_file_name(domain.num_output_files()))
    }

    /// Observes the run's lifecycle state on disk.
    ///
    /// # Errors
    ///
    /// `RunError::CacheCorruption` when a sentinel exists but is unreadable
    /// or names a terminal-state file that is missing.
    pub fn state(&self, domain: &DomainState) -> Result<RunState, RunError> {
        if !self.run_dir.exists() {
            return Ok(RunState::Pending);
        }
        let Some(sentinel) = CompletionSentinel::read(&self.run_dir)? else {
            return Ok(RunState::InProgress);
        };
        let terminal = self.run_dir.join(&sentinel.terminal_file);
        if !terminal.exists() {
            return Err(RunError::CacheCorruption {
                run: self.fingerprint.to_hex(),
                reason: format!("terminal-state file '{}' is missing", sentinel.terminal_file),
            });
        }
        let expected = self.terminal_pressure_path(domain);
        if terminal != expected {
            return Err(RunError::CacheCorruption {
                run: self.fingerprint.to_hex(),
                reason: format!(
                    "sentinel names '{}', expected '{}'",
                    sentinel.terminal_file,
                    terminal_file_name(domain.num_output_files())
                ),
            });
        }
        Ok(RunState::Complete)
    }
}

/// Recursively copies a base-input directory into a run directory.
fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<(), RunError> {
    if !src.exists() {
        return Err(RunError::InputMissing {
            path: src.to_path_buf(),
        });
    }
    fs::create_dir_all(dst).map_err(|e| RunError::io(dst, e))?;
    for entry in fs::read_dir(src).map_err(|e| RunError::io(src, e))? {
        let entry = entry.map_err(|e| RunError::io(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| RunError::io(&from, e))?;
        if file_type.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|e| RunError::io(&from, e))?;
        }
    }
    Ok(())
}

/// Drives one year of the external solver.
#[derive(Debug)]
pub struct YearExecutor<'a, S, R, W> {
    domain: &'a DomainState,
    solver: &'a S,
    grid_reader: &'a R,
    grid_writer: &'a W,
    flux_mode: FluxMode,
}

impl<'a, S, R, W> YearExecutor<'a, S, R, W>
where
    S: Solver,
    R: GridReader,
    W: GridWriter,
{
    /// Creates an executor for one domain.
    pub const fn new(
        domain: &'a DomainState,
        solver: &'a S,
        grid_reader: &'a R,
        grid_writer: &'a W,
        flux_mode: FluxMode,
    ) -> Self {
        Self {
            domain,
            solver,
            grid_reader,
            grid_writer,
            flux_mode,
        }
    }

    /// Runs one simulated year, returning the terminal-state file path.
    ///
    /// `initial_pressure` is the previous year's terminal state; None for
    /// the first year of a sequence.
    ///
    /// # Errors
    ///
    /// Any missing expected input aborts the year; solver failure propagates
    /// as `RunError::SolverExecution`. No partial output is deleted.
    pub fn run(
        &self,
        run: &YearRun,
        initial_pressure: Option<&Path>,
    ) -> Result<PathBuf, DroughtError> {
        let run_dir = run.run_dir();

        self.prepare(run)?;
        let config = self.configure_forcing(run, initial_pressure)?;

        // EXECUTE
        config
            .write_snapshot(run_dir)
            .map_err(DroughtError::Run)?;
        self.solver.run(&config, run_dir).map_err(DroughtError::Run)?;

        // PERSIST
        let terminal = run.terminal_pressure_path(self.domain);
        if !terminal.exists() {
            return Err(DroughtError::Run(RunError::SolverExecution {
                run: run.fingerprint().to_hex(),
                reason: format!(
                    "solver did not produce terminal-state file '{}'",
                    terminal_file_name(self.domain.num_output_files())
                ),
            }));
        }
        let sentinel = CompletionSentinel::for_terminal_file(&terminal).map_err(DroughtError::Run)?;
        sentinel.write(run_dir).map_err(DroughtError::Run)?;
        Ok(terminal)
    }

    /// PREPARE: materialize the working directory from the wetness-class
    /// base inputs, record provenance, and swap in the irrigation vegetation
    /// parameters when needed.
    fn prepare(&self, run: &YearRun) -> Result<(), DroughtError> {
        let year = run.scenario_year();
        let base = self.domain.base_input_dir(year.wetness);
        let run_dir = run.run_dir();

        if let Some(parent) = run_dir.parent() {
            fs::create_dir_all(parent).map_err(|e| DroughtError::Run(RunError::io(parent, e)))?;
        }
        copy_dir_recursive(&base, run_dir).map_err(DroughtError::Run)?;

        // Provenance: the exact prefix that produced this directory.
        let sequence_path = run_dir.join(SEQUENCE_FILE);
        let text = serde_json::to_string_pretty(run.prefix()).map_err(|e| {
            DroughtError::Run(RunError::io(
                &sequence_path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            ))
        })?;
        fs::write(&sequence_path, text)
            .map_err(|e| DroughtError::Run(RunError::io(&sequence_path, e)))?;

        // And the domain configuration in effect when this year ran.
        let config_path = run_dir.join(CONFIG_SNAPSHOT_FILE);
        let config_text = serde_json::to_string_pretty(self.domain.config()).map_err(|e| {
            DroughtError::Run(RunError::io(
                &config_path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            ))
        })?;
        fs::write(&config_path, config_text)
            .map_err(|e| DroughtError::Run(RunError::io(&config_path, e)))?;

        if year.irrigation {
            let irrigation_vegp = run_dir.join(VEGP_IRRIGATION_FILE);
            if !irrigation_vegp.exists() {
                return Err(DroughtError::Run(RunError::InputMissing {
                    path: irrigation_vegp,
                }));
            }
            let vegp = run_dir.join(VEGP_FILE);
            if vegp.exists() {
                fs::remove_file(&vegp).map_err(|e| DroughtError::Run(RunError::io(&vegp, e)))?;
            }
            fs::copy(&irrigation_vegp, &vegp)
                .map_err(|e| DroughtError::Run(RunError::io(&irrigation_vegp, e)))?;
        }
        Ok(())
    }

    /// CONFIGURE_FORCING: derive and write the flux grids when the year
    /// pumps, and assemble the solver configuration.
    fn configure_forcing(
        &self,
        run: &YearRun,
        initial_pressure: Option<&Path>,
    ) -> Result<SolverConfig, DroughtError> {
        let year = run.scenario_year();
        let run_dir = run.run_dir();
        let (p, q) = self.domain.topology();

        let mut builder = SolverConfig::builder(
            self.domain.stop_time(),
            self.domain.dump_interval(),
            (p, q),
        )
        .start_count(0);

        if let Some(path) = initial_pressure {
            builder = builder.initial_pressure(path.to_path_buf());
        }

        if !year.pumps() {
            // Zero anthropogenic withdrawal: the year runs with no forcing.
            return Ok(builder.build());
        }

        let mask_path = run_dir.join(MASK_FILE);
        let mask = self.grid_reader.read(&mask_path).map_err(DroughtError::Run)?;
        let landcover = LandCoverTable::from_file(&run_dir.join(VEGM_FILE))?;

        let build = FluxFieldBuilder::new(self.domain).build(&mask, &landcover, year)?;
        let schedule = FluxSchedule::plan(
            build.field,
            self.flux_mode,
            self.domain.stop_time(),
            1,
        );

        match &schedule {
            FluxSchedule::Static { field } => {
                self.grid_writer
                    .write(&run_dir.join(FLUX_ON_FILE), field, p, q)
                    .map_err(DroughtError::Run)?;
                builder = builder.forcing(FLUX_ON_FILE, false);
            }
            FluxSchedule::DutyCycle { on, off, period } => {
                self.grid_writer
                    .write(&run_dir.join(FLUX_ON_FILE), on, p, q)
                    .map_err(DroughtError::Run)?;
                self.grid_writer
                    .write(&run_dir.join(FLUX_OFF_FILE), off, p, q)
                    .map_err(DroughtError::Run)?;
                // One file per timestep, toggling every half day. The +2
                // covers the solver's inclusive final step.
                for timestep in 0..self.domain.stop_time() + 2 {
                    let field = if FluxSchedule::duty_cycle_on(timestep, *period) {
                        on
                    } else {
                        off
                    };
                    self.grid_writer
                        .write(&run_dir.join(flux_step_file_name(timestep)), field, p, q)
                        .map_err(DroughtError::Run)?;
                }
                builder = builder.forcing("fluxes", true);
            }
            FluxSchedule::TimeSeries { field, steps } => {
                for timestep in 0..*steps {
                    self.grid_writer
                        .write(&run_dir.join(flux_step_file_name(timestep)), field, p, q)
                        .map_err(DroughtError::Run)?;
                }
                builder = builder.forcing("fluxes", true);
            }
        }

        if let Some(irrigation) = build.irrigation {
            builder = builder.irrigation(irrigation);
        }
        Ok(builder.build())
    }
}
