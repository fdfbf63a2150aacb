//! Dense 3-D grids and the binary grid-file I/O boundary.
//!
//! The flux field and the domain mask are both layer-major dense arrays
//! (layer x row x column). Binary grid-file formats belong to an external
//! collaborator and are abstracted behind `GridReader`/`GridWriter`; this
//! crate never interprets the on-disk byte layout itself.

use std::path::Path;

use crate::error::RunError;

/// A dense 3-D array in (layer, row, column) order.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid3 {
    /// Number of vertical layers.
    pub nz: usize,
    /// Number of rows (y).
    pub ny: usize,
    /// Number of columns (x).
    pub nx: usize,
    data: Vec<f64>,
}

impl Grid3 {
    /// Creates a zero-filled grid.
    #[must_use]
    pub fn zeros(nz: usize, ny: usize, nx: usize) -> Self {
        Self {
            nz,
            ny,
            nx,
            data: vec![0.0; nz * ny * nx],
        }
    }

    /// Creates a grid from raw layer-major data.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != nz * ny * nx`.
    #[must_use]
    pub fn from_data(nz: usize, ny: usize, nx: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), nz * ny * nx, "grid data length mismatch");
        Self { nz, ny, nx, data }
    }

    #[inline]
    fn index(&self, z: usize, y: usize, x: usize) -> usize {
        debug_assert!(z < self.nz && y < self.ny && x < self.nx);
        (z * self.ny + y) * self.nx + x
    }

    /// Value at (layer, row, column).
    #[inline]
    #[must_use]
    pub fn get(&self, z: usize, y: usize, x: usize) -> f64 {
        self.data[self.index(z, y, x)]
    }

    /// Sets the value at (layer, row, column).
    #[inline]
    pub fn set(&mut self, z: usize, y: usize, x: usize, value: f64) {
        let i = self.index(z, y, x);
        self.data[i] = value;
    }

    /// Raw layer-major data.
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Fills one vertical layer with a constant value.
    pub fn fill_layer(&mut self, z: usize, value: f64) {
        let start = z * self.ny * self.nx;
        let end = start + self.ny * self.nx;
        self.data[start..end].fill(value);
    }

    /// Returns a copy scaled by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        let data = self.data.iter().map(|v| v * factor).collect();
        Self {
            nz: self.nz,
            ny: self.ny,
            nx: self.nx,
            data,
        }
    }

    /// Element-wise product with another grid of the same shape.
    ///
    /// # Panics
    ///
    /// Panics if shapes differ.
    #[must_use]
    pub fn hadamard(&self, other: &Self) -> Self {
        assert_eq!(
            (self.nz, self.ny, self.nx),
            (other.nz, other.ny, other.nx),
            "grid shape mismatch"
        );
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a * b)
            .collect();
        Self {
            nz: self.nz,
            ny: self.ny,
            nx: self.nx,
            data,
        }
    }

    /// Sum over every cell.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Number of surface-layer cells (layer 0) with a positive value.
    #[must_use]
    pub fn active_surface_cells(&self) -> usize {
        let surface = self.ny * self.nx;
        self.data[..surface].iter().filter(|v| **v > 0.0).count()
    }
}

/// Reads a gridded binary file into a dense array.
///
/// Implemented by the external grid-I/O collaborator; tests substitute
/// in-memory implementations.
pub trait GridReader {
    /// Reads the grid at `path`.
    ///
    /// # Errors
    ///
    /// `RunError::InputMissing` when the file is absent, `RunError::Io`
    /// otherwise.
    fn read(&self, path: &Path) -> Result<Grid3, RunError>;
}

/// Writes a dense array as a gridded binary file.
pub trait GridWriter {
    /// Writes `grid` to `path`, pre-distributed over a `p` x `q` process
    /// topology where the format supports it.
    ///
    /// # Errors
    ///
    /// `RunError::Io` on any write failure.
    fn write(&self, path: &Path, grid: &Grid3, p: usize, q: usize) -> Result<(), RunError>;
}
