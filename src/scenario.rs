//! Scenario descriptors for simulated years.
//!
//! A drought scenario is an ordered sequence of yearly descriptors. Order is
//! semantically significant: year N's initial pressure field derives from
//! year N-1's terminal state, so a sequence is a hard dependency chain.
//!
//! Sequences are read from a declarative JSON document
//! `{"name": ..., "years": [{"wetness": ..., "pumping_rate_fraction": ...,
//! "irrigation": ...}, ...]}` or constructed programmatically. They are
//! immutable for the lifetime of a run.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fingerprint::FIELD_DELIMITER;
use crate::fingerprint::YEAR_DELIMITER;

/// Wetness class selecting which historical base inputs seed a simulated year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wetness {
    /// A historically dry water year.
    #[serde(alias = "D")]
    Dry,
    /// A historically average water year.
    #[serde(alias = "A")]
    Average,
    /// A historically wet water year.
    #[serde(alias = "W")]
    Wet,
}

impl Wetness {
    /// Canonical lowercase token, used in fingerprints and directory names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dry => "dry",
            Self::Average => "average",
            Self::Wet => "wet",
        }
    }

    /// All wetness classes, in provisioning order.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Dry, Self::Average, Self::Wet]
    }
}

impl std::fmt::Display for Wetness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One year's scenario descriptor. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioYear {
    /// Which wetness class's base inputs seed this year.
    pub wetness: Wetness,

    /// Dimensionless multiplier on the domain's nominal withdrawal rate.
    /// 0 means no anthropogenic pumping for this year.
    pub pumping_rate_fraction: f64,

    /// Whether irrigation forcing is applied on top of pumping.
    pub irrigation: bool,

    /// Overrides the domain's cropland classifier key for this year, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cropland_classifier: Option<String>,
}

impl ScenarioYear {
    /// Creates a validated scenario year.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidFraction` when the pumping rate fraction
    /// is negative, NaN, or infinite.
    pub fn new(
        wetness: Wetness,
        pumping_rate_fraction: f64,
        irrigation: bool,
    ) -> Result<Self, ConfigError> {
        let year = Self {
            wetness,
            pumping_rate_fraction,
            irrigation,
            cropland_classifier: None,
        };
        year.validate()?;
        Ok(year)
    }

    /// Sets a per-year cropland classifier key.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DelimiterInField` if the key contains a character
    /// reserved by the fingerprint serialization.
    pub fn with_classifier(mut self, key: impl Into<String>) -> Result<Self, ConfigError> {
        let key = key.into();
        if key.contains(FIELD_DELIMITER) || key.contains(YEAR_DELIMITER) {
            return Err(ConfigError::DelimiterInField { key });
        }
        self.cropland_classifier = Some(key);
        Ok(self)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !self.pumping_rate_fraction.is_finite() || self.pumping_rate_fraction < 0.0 {
            return Err(ConfigError::InvalidFraction {
                value: self.pumping_rate_fraction,
            });
        }
        if let Some(key) = &self.cropland_classifier {
            if key.contains(FIELD_DELIMITER) || key.contains(YEAR_DELIMITER) {
                return Err(ConfigError::DelimiterInField { key: key.clone() });
            }
        }
        Ok(())
    }

    /// Whether this year performs any anthropogenic withdrawal.
    #[must_use]
    pub fn pumps(&self) -> bool {
        self.pumping_rate_fraction > 0.0
    }
}

/// An ordered, non-empty list of scenario years with a human-readable name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSequence {
    /// Human-readable sequence name (e.g. "3_year_drought"). Not part of the
    /// fingerprint: two sequences with equal years share cached prefixes
    /// regardless of their names.
    pub name: String,

    /// The yearly descriptors, in execution order.
    pub years: Vec<ScenarioYear>,
}

impl ScenarioSequence {
    /// Creates a validated sequence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptySequence` for an empty year list, or the
    /// first failing year's validation error.
    pub fn new(name: impl Into<String>, years: Vec<ScenarioYear>) -> Result<Self, ConfigError> {
        let name = name.into();
        if years.is_empty() {
            return Err(ConfigError::EmptySequence { name });
        }
        for year in &years {
            year.validate()?;
        }
        Ok(Self { name, years })
    }

    /// Reads a sequence from a declarative JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Malformed` when the file cannot be read or
    /// parsed, and the usual validation errors afterwards.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let raw: Self = serde_json::from_str(&text).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::new(raw.name, raw.years)
    }

    /// Number of years in the sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.years.len()
    }

    /// Always false: sequences are non-empty by construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    /// The first `k` years of the sequence.
    ///
    /// # Panics
    ///
    /// Panics if `k` is zero or exceeds the sequence length.
    #[must_use]
    pub fn prefix(&self, k: usize) -> &[ScenarioYear] {
        assert!(k >= 1 && k <= self.years.len(), "prefix length out of range");
        &self.years[..k]
    }
}
