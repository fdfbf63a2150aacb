//! Pumping/irrigation flux derivation.
//!
//! `FluxFieldBuilder` turns a domain mask, a land-cover table, and one
//! year's scenario parameters into the 3-D volumetric forcing field the
//! solver consumes, plus the land-surface irrigation parameters when
//! irrigation is enabled.
//!
//! The derivation, in order:
//! 1. Irrigation mask = cropland cells (classifier columns positive) AND
//!    active domain cells.
//! 2. Base rate on one fixed vertical layer, negative (a withdrawal),
//!    normalized by that layer's thickness so the areal flux is independent
//!    of vertical discretization.
//! 3. Scaled by `actual_pumping_rate = nominal_rate x pumped_area_fraction
//!    x pumping_rate_fraction`, where the pumped-area fraction normalizes an
//!    ensemble-level "fraction of nominal consumptive use" by how much of
//!    the domain is actually irrigable.

use serde::{Deserialize, Serialize};

use crate::domain::DomainState;
use crate::error::FluxError;
use crate::grid::Grid3;
use crate::landcover::LandCoverTable;
use crate::scenario::ScenarioYear;

/// Millimetres per metre, for the withdrawal-to-application conversion.
pub const MM_PER_M: f64 = 1000.0;

/// Seconds per solver time unit (hourly timesteps).
pub const SECONDS_PER_HOUR: f64 = 3600.0;

/// Fraction of applied irrigation water that is not consumptive.
pub const RETURN_FLOW_FRACTION: f64 = 0.3;

/// Fraction of the day irrigation actually runs.
pub const FRACTION_OF_DAY_IRRIGATING: f64 = 0.5;

/// Timesteps per half-day duty-cycle phase for intermittent pumping.
pub const DUTY_CYCLE_TIMESTEPS: u64 = 12;

/// Daily irrigation window start (wall-clock HHMM).
pub const IRRIGATION_WINDOW_START: u32 = 800;

/// Daily irrigation window stop (wall-clock HHMM).
pub const IRRIGATION_WINDOW_STOP: u32 = 2000;

/// Unit conversion from withdrawal rate (m/h) to application rate (mm/s),
/// folding in return flow and the irrigation duty cycle.
#[must_use]
pub fn conversion_factor() -> f64 {
    SECONDS_PER_HOUR / MM_PER_M * RETURN_FLOW_FRACTION / FRACTION_OF_DAY_IRRIGATING
}

/// Land-surface irrigation forcing parameters handed to the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrigationForcing {
    /// Application rate in the solver's land-surface units (mm/s).
    pub application_rate: f64,

    /// Irrigation delivery type.
    pub kind: String,

    /// Irrigation scheduling cycle.
    pub cycle: String,

    /// Daily application window start (HHMM).
    pub window_start: u32,

    /// Daily application window stop (HHMM).
    pub window_stop: u32,
}

impl IrrigationForcing {
    /// Derives the forcing from a (positive) withdrawal rate.
    #[must_use]
    pub fn from_withdrawal(withdrawal_rate: f64) -> Self {
        Self {
            application_rate: withdrawal_rate * conversion_factor(),
            kind: "Drip".to_string(),
            cycle: "Constant".to_string(),
            window_start: IRRIGATION_WINDOW_START,
            window_stop: IRRIGATION_WINDOW_STOP,
        }
    }

    /// Inverts the conversion, recovering the withdrawal rate.
    #[must_use]
    pub fn withdrawal_rate(&self) -> f64 {
        self.application_rate / conversion_factor()
    }
}

/// How flux forcing is laid out in time for the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FluxMode {
    /// One static grid applied for the whole year.
    Static,
    /// On/off grids toggling on a half-day duty cycle; the "on" grid is
    /// doubled so the time-averaged withdrawal matches the static mode.
    DutyCycle,
    /// One identical grid file per timestep, for solvers that require an
    /// explicit series rather than a cyclic reference.
    TimeSeries,
}

/// The result of one flux derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxBuild {
    /// Volumetric forcing rates, layer x row x column. Negative = withdrawal.
    pub field: Grid3,

    /// Irrigation forcing, present iff the year enables irrigation.
    pub irrigation: Option<IrrigationForcing>,

    /// Irrigated cells over active surface cells.
    pub pumped_area_fraction: f64,

    /// Effective per-cell withdrawal magnitude after all scaling.
    pub actual_pumping_rate: f64,
}

/// Time layout of the flux field, ready to be written for the solver.
#[derive(Debug, Clone, PartialEq)]
pub enum FluxSchedule {
    /// A single grid applied for the whole year.
    Static {
        /// The forcing grid.
        field: Grid3,
    },
    /// Alternating grids on a fixed duty cycle.
    DutyCycle {
        /// Doubled-rate grid for the "on" phase.
        on: Grid3,
        /// Zero grid for the "off" phase.
        off: Grid3,
        /// Phase length in timesteps.
        period: u64,
    },
    /// One identical grid per timestep.
    TimeSeries {
        /// The per-timestep forcing grid.
        field: Grid3,
        /// Number of timesteps covered.
        steps: u64,
    },
}

impl FluxSchedule {
    /// Lays out a derived field in time according to `mode`.
    #[must_use]
    pub fn plan(field: Grid3, mode: FluxMode, stop_time: u64, time_step: u64) -> Self {
        match mode {
            FluxMode::Static => Self::Static { field },
            FluxMode::DutyCycle => Self::DutyCycle {
                on: field.scaled(2.0),
                off: field.scaled(0.0),
                period: DUTY_CYCLE_TIMESTEPS,
            },
            FluxMode::TimeSeries => Self::TimeSeries {
                steps: stop_time / time_step,
                field,
            },
        }
    }

    /// Whether the duty cycle is in its "on" phase at `timestep`.
    ///
    /// The cycle starts off: the toggle fires on the phase boundary at
    /// timestep 0, so steps 0..period are off and period..2*period are on.
    #[must_use]
    pub fn duty_cycle_on(timestep: u64, period: u64) -> bool {
        (timestep / period) % 2 == 1
    }

    /// The grid in effect at `timestep`.
    #[must_use]
    pub fn field_at(&self, timestep: u64) -> &Grid3 {
        match self {
            Self::Static { field } | Self::TimeSeries { field, .. } => field,
            Self::DutyCycle { on, off, period } => {
                if Self::duty_cycle_on(timestep, *period) {
                    on
                } else {
                    off
                }
            }
        }
    }

    /// Time-averaged rate at one cell over a full cycle.
    ///
    /// All modes conserve the same average; this is what the
    /// mass-conservation property tests.
    #[must_use]
    pub fn time_averaged(&self, z: usize, y: usize, x: usize) -> f64 {
        match self {
            Self::Static { field } | Self::TimeSeries { field, .. } => field.get(z, y, x),
            Self::DutyCycle { on, off, .. } => (on.get(z, y, x) + off.get(z, y, x)) / 2.0,
        }
    }
}

/// Derives flux fields for one domain.
///
/// One canonical implementation, parameterized by the domain's `FluxPolicy`
/// instead of forked per watershed.
#[derive(Debug)]
pub struct FluxFieldBuilder<'a> {
    domain: &'a DomainState,
}

impl<'a> FluxFieldBuilder<'a> {
    /// Creates a builder for one domain.
    #[must_use]
    pub const fn new(domain: &'a DomainState) -> Self {
        Self { domain }
    }

    /// Derives the flux field and irrigation forcing for one scenario year.
    ///
    /// # Errors
    ///
    /// - `FluxError::MissingClassifier` when a configured classifier column
    ///   is absent from the land-cover table.
    /// - `FluxError::GridMismatch` when table coordinates fall outside the
    ///   mask extent.
    /// - `FluxError::EmptyMask` when the mask has no active surface cells.
    /// - `FluxError::PumpingLayerOutOfRange` when the configured pumping
    ///   layer does not exist in the vertical grid.
    pub fn build(
        &self,
        mask: &Grid3,
        landcover: &LandCoverTable,
        year: &ScenarioYear,
    ) -> Result<FluxBuild, FluxError> {
        let policy = self.domain.flux_policy();
        let dz = self.domain.dz();
        let nz = dz.len();

        if policy.pumping_layer >= nz {
            return Err(FluxError::PumpingLayerOutOfRange {
                layer: policy.pumping_layer,
                nz,
            });
        }

        let total_active = mask.active_surface_cells();
        if total_active == 0 {
            return Err(FluxError::EmptyMask);
        }

        // A per-year classifier key overrides the domain policy.
        let year_columns;
        let classifier_columns: &[String] = match &year.cropland_classifier {
            Some(key) => {
                year_columns = [key.clone()];
                &year_columns
            }
            None => &policy.classifier_columns,
        };

        let irrigation_mask = landcover.irrigation_mask(classifier_columns, mask)?;
        let pumped_area = irrigation_mask.sum();
        #[allow(clippy::cast_precision_loss)]
        let pumped_area_fraction = pumped_area / total_active as f64;

        let gross = if year.irrigation {
            policy.irrigation_gross_rate
        } else {
            policy.no_irrigation_derate
        };

        let mut field = Grid3::zeros(nz, mask.ny, mask.nx);
        field.fill_layer(policy.pumping_layer, -gross / dz[policy.pumping_layer]);

        // Gate every layer by the surface irrigation mask.
        for z in 0..nz {
            for y in 0..mask.ny {
                for x in 0..mask.nx {
                    let gated = field.get(z, y, x) * irrigation_mask.get(0, y, x);
                    field.set(z, y, x, gated);
                }
            }
        }

        let actual_pumping_rate =
            policy.nominal_rate * pumped_area_fraction * year.pumping_rate_fraction;
        let field = field.scaled(actual_pumping_rate);

        let irrigation = year
            .irrigation
            .then(|| IrrigationForcing::from_withdrawal(actual_pumping_rate));

        Ok(FluxBuild {
            field,
            irrigation,
            pumped_area_fraction,
            actual_pumping_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainConfig, FluxPolicy};
    use crate::scenario::Wetness;
    use std::path::Path;

    const TABLE: &str = "vegetation cover fractions\n\
        x y 11 12 13 14\n\
        1 1 0.0 0.8 0.0 0.0\n\
        2 1 1.0 0.0 0.0 0.0\n\
        1 2 0.0 0.0 0.0 0.5\n\
        2 2 0.0 0.0 1.0 0.0\n";

    fn test_domain(pumping_layer: usize) -> DomainState {
        let config = DomainConfig {
            name: "gila".to_string(),
            huc_id: "15040001".to_string(),
            dry_year: 2002,
            average_year: 2008,
            wet_year: 2005,
            p: 2,
            q: 2,
            dz: vec![100.0, 50.0, 25.0, 10.0],
            testing: true,
            flux_policy: FluxPolicy {
                pumping_layer,
                ..FluxPolicy::default()
            },
        };
        DomainState::from_config(config, Path::new("/tmp/droughtseq-test"))
    }

    fn full_mask() -> Grid3 {
        let mut mask = Grid3::zeros(1, 2, 2);
        for y in 0..2 {
            for x in 0..2 {
                mask.set(0, y, x, 1.0);
            }
        }
        mask
    }

    fn table() -> LandCoverTable {
        LandCoverTable::parse(TABLE).unwrap()
    }

    #[test]
    fn test_build_without_irrigation() {
        let domain = test_domain(2);
        let builder = FluxFieldBuilder::new(&domain);
        let year = ScenarioYear::new(Wetness::Dry, 0.5, false).unwrap();
        let build = builder.build(&full_mask(), &table(), &year).unwrap();

        // Two cropland cells of four active.
        assert!((build.pumped_area_fraction - 0.5).abs() < 1e-12);
        // nominal 1.0 * paf 0.5 * fraction 0.5
        assert!((build.actual_pumping_rate - 0.25).abs() < 1e-12);
        assert!(build.irrigation.is_none());

        // Withdrawal sits only on the pumping layer, only on cropland cells,
        // derated to 70% of gross and normalized by dz.
        let expected = -0.7 / 25.0 * 0.25;
        assert!((build.field.get(2, 0, 0) - expected).abs() < 1e-12);
        assert!((build.field.get(2, 1, 0) - expected).abs() < 1e-12);
        assert_eq!(build.field.get(2, 0, 1), 0.0);
        assert_eq!(build.field.get(1, 0, 0), 0.0);
        assert_eq!(build.field.get(3, 0, 0), 0.0);
    }

    #[test]
    fn test_build_with_irrigation_inflates_gross_rate() {
        let domain = test_domain(2);
        let builder = FluxFieldBuilder::new(&domain);
        let year = ScenarioYear::new(Wetness::Average, 1.0, true).unwrap();
        let build = builder.build(&full_mask(), &table(), &year).unwrap();

        let expected = -1.3 / 25.0 * 0.5;
        assert!((build.field.get(2, 0, 0) - expected).abs() < 1e-12);

        let forcing = build.irrigation.expect("irrigation forcing expected");
        assert!(forcing.application_rate > 0.0);
        assert_eq!(forcing.kind, "Drip");
        assert_eq!(forcing.window_start, IRRIGATION_WINDOW_START);
        assert_eq!(forcing.window_stop, IRRIGATION_WINDOW_STOP);
    }

    #[test]
    fn test_irrigation_conversion_round_trip() {
        let withdrawal = 0.37;
        let forcing = IrrigationForcing::from_withdrawal(withdrawal);
        assert!((forcing.withdrawal_rate() - withdrawal).abs() < 1e-15);
        // And the forward formula matches its definition.
        let expected = withdrawal * SECONDS_PER_HOUR / MM_PER_M * RETURN_FLOW_FRACTION
            / FRACTION_OF_DAY_IRRIGATING;
        assert!((forcing.application_rate - expected).abs() < 1e-15);
    }

    #[test]
    fn test_per_year_classifier_override() {
        let domain = test_domain(2);
        let builder = FluxFieldBuilder::new(&domain);
        // Column 13 marks only the (2,2) cell.
        let year = ScenarioYear::new(Wetness::Dry, 1.0, false)
            .unwrap()
            .with_classifier("13")
            .unwrap();
        let build = builder.build(&full_mask(), &table(), &year).unwrap();
        assert!((build.pumped_area_fraction - 0.25).abs() < 1e-12);
        assert_eq!(build.field.get(2, 0, 0), 0.0);
        assert!(build.field.get(2, 1, 1) < 0.0);
    }

    #[test]
    fn test_build_rejects_empty_mask() {
        let domain = test_domain(2);
        let builder = FluxFieldBuilder::new(&domain);
        let year = ScenarioYear::new(Wetness::Dry, 1.0, false).unwrap();
        let empty = Grid3::zeros(1, 2, 2);
        let err = builder.build(&empty, &table(), &year).unwrap_err();
        assert!(matches!(err, FluxError::EmptyMask));
    }

    #[test]
    fn test_build_rejects_pumping_layer_out_of_range() {
        let domain = test_domain(9);
        let builder = FluxFieldBuilder::new(&domain);
        let year = ScenarioYear::new(Wetness::Dry, 1.0, false).unwrap();
        let err = builder.build(&full_mask(), &table(), &year).unwrap_err();
        assert!(matches!(err, FluxError::PumpingLayerOutOfRange { .. }));
    }

    #[test]
    fn test_duty_cycle_conserves_time_averaged_rate() {
        let domain = test_domain(2);
        let builder = FluxFieldBuilder::new(&domain);
        let year = ScenarioYear::new(Wetness::Dry, 0.5, false).unwrap();
        let build = builder.build(&full_mask(), &table(), &year).unwrap();

        let static_schedule =
            FluxSchedule::plan(build.field.clone(), FluxMode::Static, 8760, 1);
        let cycling = FluxSchedule::plan(build.field.clone(), FluxMode::DutyCycle, 8760, 1);
        let series = FluxSchedule::plan(build.field, FluxMode::TimeSeries, 8760, 1);

        for (z, y, x) in [(2, 0, 0), (2, 1, 0), (2, 0, 1)] {
            let want = static_schedule.time_averaged(z, y, x);
            assert!((cycling.time_averaged(z, y, x) - want).abs() < 1e-12);
            assert!((series.time_averaged(z, y, x) - want).abs() < 1e-12);
        }

        // Integrating the actual toggle pattern over one full cycle agrees.
        if let FluxSchedule::DutyCycle { period, .. } = cycling {
            let steps = 2 * period;
            let mut total = 0.0;
            for t in 0..steps {
                total += cycling.field_at(t).get(2, 0, 0);
            }
            #[allow(clippy::cast_precision_loss)]
            let integrated = total / steps as f64;
            assert!((integrated - static_schedule.time_averaged(2, 0, 0)).abs() < 1e-12);
        } else {
            unreachable!();
        }
    }

    #[test]
    fn test_duty_cycle_starts_off() {
        assert!(!FluxSchedule::duty_cycle_on(0, DUTY_CYCLE_TIMESTEPS));
        assert!(!FluxSchedule::duty_cycle_on(11, DUTY_CYCLE_TIMESTEPS));
        assert!(FluxSchedule::duty_cycle_on(12, DUTY_CYCLE_TIMESTEPS));
        assert!(FluxSchedule::duty_cycle_on(23, DUTY_CYCLE_TIMESTEPS));
        assert!(!FluxSchedule::duty_cycle_on(24, DUTY_CYCLE_TIMESTEPS));
    }

    #[test]
    fn test_time_series_step_count() {
        let field = Grid3::zeros(1, 1, 1);
        let schedule = FluxSchedule::plan(field, FluxMode::TimeSeries, 24, 1);
        if let FluxSchedule::TimeSeries { steps, .. } = schedule {
            assert_eq!(steps, 24);
        } else {
            unreachable!();
        }
    }

    #[test]
    fn test_zero_fraction_zeroes_field() {
        let domain = test_domain(2);
        let builder = FluxFieldBuilder::new(&domain);
        let year = ScenarioYear::new(Wetness::Dry, 0.0, false).unwrap();
        let build = builder.build(&full_mask(), &table(), &year).unwrap();
        assert_eq!(build.actual_pumping_rate, 0.0);
        assert!(build.field.data().iter().all(|v| *v == 0.0));
    }
}
