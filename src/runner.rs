//! Sequence walking with prefix reuse.
//!
//! `SequenceRunner` folds left-to-right over a scenario sequence. For every
//! prefix length it derives the fingerprint, checks the identity-addressed
//! run directory, and either reuses a completed year or executes it,
//! threading each year's terminal pressure file into the next year's
//! initial condition.
//!
//! Independent sequences sharing a prefix (ensemble members with identical
//! spin-up years) each perform this same walk as separate OS processes; the
//! filesystem is the single source of truth for completion. Two processes
//! racing on the same prefix may both execute it — redundant but not
//! incorrect, an accepted trade-off for this batch workload.

use std::path::PathBuf;

use crate::domain::DomainState;
use crate::error::{DroughtError, DroughtResult, RunError};
use crate::flux::FluxMode;
use crate::grid::{GridReader, GridWriter};
use crate::scenario::ScenarioSequence;
use crate::solver::Solver;
use crate::year::{RunState, YearExecutor, YearRun};

/// Walks scenario sequences over one domain.
#[derive(Debug)]
pub struct SequenceRunner<'a, S, R, W> {
    domain: &'a DomainState,
    solver: &'a S,
    grid_reader: &'a R,
    grid_writer: &'a W,
    flux_mode: FluxMode,
}

impl<'a, S, R, W> SequenceRunner<'a, S, R, W>
where
    S: Solver,
    R: GridReader,
    W: GridWriter,
{
    /// Creates a runner for one domain.
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

    /// Maps every prefix of a sequence to its run directory, executing
    /// nothing. Useful for locating cached outputs for aggregation.
    #[must_use]
    pub fn output_folders(&self, sequence: &ScenarioSequence) -> Vec<PathBuf> {
        (1..=sequence.len())
            .map(|k| {
                YearRun::new(self.domain, sequence.prefix(k))
                    .run_dir()
                    .to_path_buf()
            })
            .collect()
    }

    /// Runs a full sequence, reusing cached prefixes.
    ///
    /// Returns one run directory per year, in sequence order. Years execute
    /// strictly in order: year k never begins before year k-1's output is
    /// complete.
    ///
    /// # Errors
    ///
    /// Fatal on the first failing year. A run directory without a
    /// completion sentinel (a prior walk died mid-year, or another process
    /// is mid-execution) is reported as `RunError::CacheCorruption`; no
    /// partial output is deleted automatically.
    pub fn run_sequence(&self, sequence: &ScenarioSequence) -> DroughtResult<Vec<PathBuf>> {
        let executor = YearExecutor::new(
            self.domain,
            self.solver,
            self.grid_reader,
            self.grid_writer,
            self.flux_mode,
        );

        let mut output_dirs = Vec::with_capacity(sequence.len());
        let mut previous_terminal: Option<PathBuf> = None;

        for k in 1..=sequence.len() {
            let run = YearRun::new(self.domain, sequence.prefix(k));
            let state = run.state(self.domain).map_err(DroughtError::Run)?;

            let terminal = match state {
                RunState::Complete => {
                    // Cache hit: a prior walk (possibly of a different
                    // sequence sharing this prefix) already computed it.
                    run.terminal_pressure_path(self.domain)
                }
                RunState::Pending => {
                    executor.run(&run, previous_terminal.as_deref())?
                }
                RunState::InProgress => {
                    return Err(DroughtError::Run(RunError::CacheCorruption {
                        run: run.fingerprint().to_hex(),
                        reason: "run directory exists without a completion sentinel \
                                 (unfinished or concurrent execution)"
                            .to_string(),
                    }));
                }
            };

            output_dirs.push(run.run_dir().to_path_buf());
            previous_terminal = Some(terminal);
        }
        Ok(output_dirs)
    }
}
