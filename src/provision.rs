//! External collaborator boundaries: domain provisioning and aggregation.
//!
//! Before any sequence can run, a domain needs its three canonical
//! wetness-class base-input sets (mask, static fields, meteorological
//! forcing). Materializing them is the job of an external geospatial
//! subsetting/catalog service; this crate only decides *which* classes
//! still need provisioning. Likewise, concatenating per-year outputs into
//! one analysis dataset belongs to an external aggregator.

use std::path::PathBuf;

use crate::domain::DomainState;
use crate::error::RunError;
use crate::scenario::Wetness;

/// Prepares the canonical base inputs for one wetness class of a domain.
pub trait DomainProvisioner {
    /// Materializes the base-input set for `wetness`, subsetting the
    /// historical `water_year` into `domain.base_input_dir(wetness)`.
    ///
    /// # Errors
    ///
    /// `RunError` when the provisioning service fails or writes nothing.
    fn provision(
        &self,
        domain: &DomainState,
        wetness: Wetness,
        water_year: i32,
    ) -> Result<(), RunError>;
}

/// Concatenates per-year solver outputs into one analysis-ready dataset.
pub trait OutputAggregator {
    /// Aggregates the ordered per-year run directories, returning the path
    /// of the combined dataset.
    ///
    /// # Errors
    ///
    /// `RunError` when any input directory is unreadable.
    fn aggregate(&self, output_dirs: &[PathBuf]) -> Result<PathBuf, RunError>;
}

/// Provisions whichever wetness-class base inputs the domain still lacks.
///
/// Existing base-input directories are left untouched, so repeated calls
/// are cheap no-ops once a domain is materialized. Returns the classes that
/// were provisioned by this call.
///
/// # Errors
///
/// Propagates the first provisioning failure.
pub fn ensure_base_inputs<P: DomainProvisioner>(
    domain: &DomainState,
    provisioner: &P,
) -> Result<Vec<Wetness>, RunError> {
    let mut provisioned = Vec::new();
    for wetness in Wetness::all() {
        if domain.base_inputs_exist(wetness) {
            continue;
        }
        let water_year = domain.config().year_for(wetness);
        provisioner.provision(domain, wetness, water_year)?;
        provisioned.push(wetness);
    }
    Ok(provisioned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainConfig, FluxPolicy};
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;

    struct RecordingProvisioner {
        calls: RefCell<Vec<(Wetness, i32)>>,
    }

    impl RecordingProvisioner {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl DomainProvisioner for RecordingProvisioner {
        fn provision(
            &self,
            domain: &DomainState,
            wetness: Wetness,
            water_year: i32,
        ) -> Result<(), RunError> {
            fs::create_dir_all(domain.base_input_dir(wetness))
                .map_err(|e| RunError::io(domain.base_input_dir(wetness), e))?;
            self.calls.borrow_mut().push((wetness, water_year));
            Ok(())
        }
    }

    fn test_domain(root: &Path) -> DomainState {
        let config = DomainConfig {
            name: "wolf".to_string(),
            huc_id: "x".to_string(),
            dry_year: 2002,
            average_year: 2008,
            wet_year: 2005,
            p: 1,
            q: 1,
            dz: vec![100.0],
            testing: true,
            flux_policy: FluxPolicy::default(),
        };
        DomainState::from_config(config, root)
    }

    #[test]
    fn test_ensure_base_inputs_provisions_all_three_classes() {
        let dir = tempfile::tempdir().unwrap();
        let domain = test_domain(dir.path());
        let provisioner = RecordingProvisioner::new();

        let provisioned = ensure_base_inputs(&domain, &provisioner).unwrap();
        assert_eq!(
            provisioned,
            vec![Wetness::Dry, Wetness::Average, Wetness::Wet]
        );
        assert_eq!(
            *provisioner.calls.borrow(),
            vec![
                (Wetness::Dry, 2002),
                (Wetness::Average, 2008),
                (Wetness::Wet, 2005)
            ]
        );
    }

    #[test]
    fn test_ensure_base_inputs_skips_existing_classes() {
        let dir = tempfile::tempdir().unwrap();
        let domain = test_domain(dir.path());
        fs::create_dir_all(domain.base_input_dir(Wetness::Average)).unwrap();

        let provisioner = RecordingProvisioner::new();
        let provisioned = ensure_base_inputs(&domain, &provisioner).unwrap();
        assert_eq!(provisioned, vec![Wetness::Dry, Wetness::Wet]);
    }

    #[test]
    fn test_ensure_base_inputs_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let domain = test_domain(dir.path());
        let provisioner = RecordingProvisioner::new();

        ensure_base_inputs(&domain, &provisioner).unwrap();
        let second = ensure_base_inputs(&domain, &provisioner).unwrap();
        assert!(second.is_empty());
        assert_eq!(provisioner.calls.borrow().len(), 3);
    }
}
