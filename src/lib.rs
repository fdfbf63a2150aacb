//! # droughtseq - run-sequence execution for drought ensembles
//!
//! droughtseq orchestrates multi-year ensemble simulations of
//! groundwater/surface-water drought scenarios by chaining runs of an
//! external hydrological solver: each simulated year's initial state is the
//! previous year's terminal pressure field, and scenario prefixes shared
//! across an ensemble are computed exactly once.
//!
//! ## Core Concepts
//!
//! - **ScenarioSequence**: an ordered list of yearly scenario descriptors
//!   (wetness class, pumping-rate fraction, irrigation flag)
//! - **SequenceFingerprint**: a content-addressed identity for a sequence
//!   prefix, naming its on-disk run directory
//! - **FluxFieldBuilder**: derives the 3-D pumping/irrigation forcing field
//!   from land cover, the domain mask, and scenario parameters
//! - **YearExecutor**: drives one year of the external solver through
//!   PREPARE, CONFIGURE_FORCING, EXECUTE, and PERSIST
//! - **SequenceRunner**: walks a sequence, reusing cached prefixes and
//!   threading terminal state between consecutive years
//!
//! ## Usage
//!
//! ```rust,ignore
//! use droughtseq::{
//!     CommandSolver, DomainConfig, DomainState, FluxMode, ScenarioSequence,
//!     SequenceRunner,
//! };
//!
//! let config = DomainConfig::from_file("domains/gila/config.json".as_ref())?;
//! let domain = DomainState::from_config(config, "/data/drought-ensemble".as_ref());
//! let sequence = ScenarioSequence::from_file("run_sequences/3_year_drought.json".as_ref())?;
//!
//! let solver = CommandSolver::new("parflow-run");
//! let runner = SequenceRunner::new(&domain, &solver, &reader, &writer, FluxMode::Static);
//! let output_dirs = runner.run_sequence(&sequence)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod flux;
pub mod grid;
pub mod landcover;
pub mod provision;
pub mod runner;
pub mod scenario;
pub mod solver;
pub mod year;

// Re-export primary types at crate root for convenience
pub use domain::{DomainConfig, DomainState, FluxPolicy, HOURS_PER_YEAR, TESTING_STOP_TIME};
pub use error::{ConfigError, DroughtError, DroughtResult, FluxError, RunError};
pub use fingerprint::{fingerprint, SequenceFingerprint};
pub use flux::{FluxBuild, FluxFieldBuilder, FluxMode, FluxSchedule, IrrigationForcing};
pub use grid::{Grid3, GridReader, GridWriter};
pub use landcover::{LandCoverCell, LandCoverTable};
pub use provision::{ensure_base_inputs, DomainProvisioner, OutputAggregator};
pub use runner::SequenceRunner;
pub use scenario::{ScenarioSequence, ScenarioYear, Wetness};
pub use solver::{CommandSolver, ForcingConfig, Solver, SolverConfig, SolverConfigBuilder};
pub use year::{CompletionSentinel, RunState, YearExecutor, YearRun};
