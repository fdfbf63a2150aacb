//! Land-cover classification tables.
//!
//! The land-surface model's vegetation table (`drv_vegm.dat` layout) maps
//! each surface grid cell to per-class cover fractions: a title line, a
//! header line naming the columns, then one whitespace-separated row per
//! cell with 1-based `x y` coordinates followed by the class fractions.
//!
//! A cell counts as irrigated cropland when the sum of the configured
//! classifier columns is positive; intersecting with the domain mask yields
//! the irrigation mask that gates every pumping flux.

use std::fs;
use std::path::Path;

use crate::error::{ConfigError, DroughtError, FluxError, RunError};
use crate::grid::Grid3;

/// One parsed table row: a surface cell and its per-column values.
#[derive(Debug, Clone, PartialEq)]
pub struct LandCoverCell {
    /// 1-based column coordinate.
    pub x: usize,
    /// 1-based row coordinate.
    pub y: usize,
    /// Values aligned with `LandCoverTable::columns`.
    pub values: Vec<f64>,
}

/// A parsed land-cover classification table.
#[derive(Debug, Clone, PartialEq)]
pub struct LandCoverTable {
    /// Class column labels, in file order (coordinates excluded).
    pub columns: Vec<String>,
    /// Per-cell rows.
    pub cells: Vec<LandCoverCell>,
}

impl LandCoverTable {
    /// Parses a vegetation table file.
    ///
    /// # Errors
    ///
    /// `RunError::InputMissing` when the file is absent;
    /// `ConfigError::Malformed` for rows that do not parse.
    pub fn from_file(path: &Path) -> Result<Self, DroughtError> {
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DroughtError::Run(RunError::InputMissing {
                    path: path.to_path_buf(),
                })
            } else {
                DroughtError::Run(RunError::io(path, e))
            }
        })?;
        Self::parse(&text).map_err(|reason| {
            DroughtError::Config(ConfigError::Malformed {
                path: path.to_path_buf(),
                reason,
            })
        })
    }

    /// Parses table text: title line, header line, data rows.
    pub(crate) fn parse(text: &str) -> Result<Self, String> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        lines.next().ok_or_else(|| "empty table".to_string())?;
        let header = lines.next().ok_or_else(|| "missing header line".to_string())?;

        // The first two header fields label the coordinates; the rest are
        // class columns.
        let fields: Vec<&str> = header.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(format!("header has {} fields, expected >= 3", fields.len()));
        }
        let columns: Vec<String> = fields[2..].iter().map(|s| (*s).to_string()).collect();

        let mut cells = Vec::new();
        for (lineno, line) in lines.enumerate() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != columns.len() + 2 {
                return Err(format!(
                    "row {} has {} fields, expected {}",
                    lineno + 3,
                    parts.len(),
                    columns.len() + 2
                ));
            }
            let x: usize = parts[0]
                .parse()
                .map_err(|_| format!("row {}: bad x coordinate '{}'", lineno + 3, parts[0]))?;
            let y: usize = parts[1]
                .parse()
                .map_err(|_| format!("row {}: bad y coordinate '{}'", lineno + 3, parts[1]))?;
            let values = parts[2..]
                .iter()
                .map(|v| {
                    v.parse::<f64>()
                        .map_err(|_| format!("row {}: bad value '{v}'", lineno + 3))
                })
                .collect::<Result<Vec<f64>, String>>()?;
            cells.push(LandCoverCell { x, y, values });
        }
        Ok(Self { columns, cells })
    }

    fn column_index(&self, column: &str) -> Result<usize, FluxError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| FluxError::MissingClassifier {
                column: column.to_string(),
            })
    }

    /// Builds the surface irrigation mask: 1 where the summed classifier
    /// columns are positive AND the domain mask is active, 0 elsewhere.
    ///
    /// The result is a single-layer grid matching the mask's footprint.
    ///
    /// # Errors
    ///
    /// `FluxError::MissingClassifier` when a classifier column is absent;
    /// `FluxError::GridMismatch` when a cell coordinate falls outside the
    /// mask extent.
    pub fn irrigation_mask(
        &self,
        classifier_columns: &[String],
        mask: &Grid3,
    ) -> Result<Grid3, FluxError> {
        let indices = classifier_columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<Vec<usize>, FluxError>>()?;

        let mut out = Grid3::zeros(1, mask.ny, mask.nx);
        for cell in &self.cells {
            if cell.x == 0 || cell.y == 0 || cell.x > mask.nx || cell.y > mask.ny {
                return Err(FluxError::GridMismatch {
                    x: cell.x,
                    y: cell.y,
                    nx: mask.nx,
                    ny: mask.ny,
                });
            }
            let cropland: f64 = indices.iter().map(|&i| cell.values[i]).sum();
            if cropland > 0.0 && mask.get(0, cell.y - 1, cell.x - 1) > 0.0 {
                out.set(0, cell.y - 1, cell.x - 1, 1.0);
            }
        }
        Ok(out)
    }
}
