//! Content-addressed identity for scenario-sequence prefixes.
//!
//! A fingerprint is a blake3 digest over a canonical string serialization of
//! a sequence prefix. It is the *sole* on-disk identity of a run directory:
//! two ensemble members sharing a spin-up prefix hash to the same directory
//! and compute it exactly once.
//!
//! Collision resistance matters here. A fingerprint match is trusted as an
//! existence proof for hours-to-days of prior solver time, so a mere
//! checksum would not do.

use std::fmt;

use crate::scenario::ScenarioYear;

/// Separates the fields of one year in the canonical serialization.
pub const FIELD_DELIMITER: char = ':';

/// Separates consecutive years in the canonical serialization.
pub const YEAR_DELIMITER: char = '|';

/// A fixed-length digest identifying a scenario-sequence prefix.
///
/// Equal iff the prefixes are element-wise equal. Independent of object
/// identity, memory layout, or time: purely a function of the prefix values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceFingerprint(blake3::Hash);

impl SequenceFingerprint {
    /// Lowercase hex form, used as the run directory name.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl fmt::Display for SequenceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Canonical string form of a prefix.
///
/// Each year serializes as `wetness:fraction:irrigation[:classifier]`; years
/// are joined by `|`. The wetness token, the `Display` form of a finite
/// non-negative f64, and the bool tokens can never contain either delimiter,
/// and classifier keys are rejected at construction if they do, so the
/// serialization is injective over prefix values.
#[must_use]
pub fn canonical_string(prefix: &[ScenarioYear]) -> String {
    let mut out = String::new();
    for (i, year) in prefix.iter().enumerate() {
        if i > 0 {
            out.push(YEAR_DELIMITER);
        }
        out.push_str(year.wetness.as_str());
        out.push(FIELD_DELIMITER);
        out.push_str(&format!("{}", year.pumping_rate_fraction));
        out.push(FIELD_DELIMITER);
        out.push_str(if year.irrigation { "true" } else { "false" });
        if let Some(key) = &year.cropland_classifier {
            out.push(FIELD_DELIMITER);
            out.push_str(key);
        }
    }
    out
}

/// Derives the fingerprint of a sequence prefix.
///
/// Pure function: no side effects beyond hashing cost. Used both to name a
/// run's output directory and, re-derived for every prefix length 1..N, to
/// discover which prefixes an earlier walk already computed.
#[must_use]
pub fn fingerprint(prefix: &[ScenarioYear]) -> SequenceFingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(canonical_string(prefix).as_bytes());
    SequenceFingerprint(hasher.finalize())
}
