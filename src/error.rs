//! Error types for droughtseq.
//!
//! All errors are strongly typed using thiserror and grouped by concern:
//! configuration, flux derivation, and run execution. Every error is fatal
//! to the current sequence walk — a partially-applied simulation year cannot
//! be safely resumed mid-timestep, so there is no retry machinery.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while validating scenario or domain descriptors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Scenario sequence '{name}' contains no years")]
    EmptySequence { name: String },

    #[error("Required field '{field}' is missing")]
    MissingField { field: String },

    #[error("Malformed descriptor {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Pumping rate fraction {value} is not a finite, non-negative number")]
    InvalidFraction { value: f64 },

    #[error("Classifier key '{key}' contains a reserved delimiter character")]
    DelimiterInField { key: String },
}

/// Errors raised while deriving the pumping/irrigation flux field.
#[derive(Debug, Error)]
pub enum FluxError {
    #[error("Land-cover table is missing classifier column '{column}'")]
    MissingClassifier { column: String },

    #[error("Land-cover cell ({x}, {y}) falls outside the {nx}x{ny} domain mask")]
    GridMismatch { x: usize, y: usize, nx: usize, ny: usize },

    #[error("Domain mask has no active surface cells")]
    EmptyMask,

    #[error("Pumping layer {layer} exceeds the {nz}-layer vertical grid")]
    PumpingLayerOutOfRange { layer: usize, nz: usize },
}

/// Errors raised while preparing or executing a simulation year.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Expected input file is missing: {path}")]
    InputMissing { path: PathBuf },

    #[error("External solver failed for run {run}: {reason}")]
    SolverExecution { run: String, reason: String },

    #[error("Cached run {run} is corrupt: {reason}")]
    CacheCorruption { run: String, reason: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    /// Wraps an I/O error with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Top-level error type for droughtseq.
#[derive(Debug, Error)]
pub enum DroughtError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Flux derivation error: {0}")]
    Flux(#[from] FluxError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),
}

impl DroughtError {
    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a flux derivation error.
    #[must_use]
    pub const fn is_flux(&self) -> bool {
        matches!(self, Self::Flux(_))
    }

    /// Returns true if this error signals a corrupted cache entry.
    #[must_use]
    pub const fn is_cache_corruption(&self) -> bool {
        matches!(self, Self::Run(RunError::CacheCorruption { .. }))
    }

    /// Returns true if this error came from the external solver.
    #[must_use]
    pub const fn is_solver_failure(&self) -> bool {
        matches!(self, Self::Run(RunError::SolverExecution { .. }))
    }
}

/// Result type alias for droughtseq operations.
pub type DroughtResult<T> = Result<T, DroughtError>;
