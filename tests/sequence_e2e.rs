//! End-to-end sequence walks against a mock solver.
//!
//! The mock solver writes the terminal pressure file the way the real one
//! would and records every configuration it was invoked with, which lets
//! these tests assert prefix reuse, state chaining, and forcing wiring
//! without a hydrological model.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use droughtseq::{
    DomainConfig, DomainState, FluxMode, FluxPolicy, Grid3, GridReader, GridWriter, RunError,
    ScenarioSequence, ScenarioYear, SequenceRunner, Solver, SolverConfig, Wetness,
};

const VEGM: &str = "vegetation cover fractions\n\
    x y 11 12 13 14\n\
    1 1 0.0 0.8 0.0 0.0\n\
    2 1 1.0 0.0 0.0 0.0\n\
    1 2 0.0 0.0 0.0 0.5\n\
    2 2 0.0 0.0 1.0 0.0\n";

/// Solver stand-in: records configs and fabricates terminal output.
struct MockSolver {
    num_output_files: u64,
    invocations: RefCell<Vec<(PathBuf, SolverConfig)>>,
}

impl MockSolver {
    fn new(num_output_files: u64) -> Self {
        Self {
            num_output_files,
            invocations: RefCell::new(Vec::new()),
        }
    }

    fn count(&self) -> usize {
        self.invocations.borrow().len()
    }

    fn config_at(&self, i: usize) -> SolverConfig {
        self.invocations.borrow()[i].1.clone()
    }
}

impl Solver for MockSolver {
    fn run(&self, config: &SolverConfig, workdir: &Path) -> Result<(), RunError> {
        let terminal = workdir.join(format!("run.out.press.{:05}.pfb", self.num_output_files));
        // Unique content per run so terminal checksums differ.
        let body = format!("{} {:?}", workdir.display(), config.initial_pressure_file);
        fs::write(&terminal, body).map_err(|e| RunError::io(&terminal, e))?;
        self.invocations
            .borrow_mut()
            .push((workdir.to_path_buf(), config.clone()));
        Ok(())
    }
}

/// Grid I/O stand-in: JSON lines of dims plus data.
struct JsonGridIo;

impl GridReader for JsonGridIo {
    fn read(&self, path: &Path) -> Result<Grid3, RunError> {
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RunError::InputMissing {
                    path: path.to_path_buf(),
                }
            } else {
                RunError::io(path, e)
            }
        })?;
        let (dims, data): ((usize, usize, usize), Vec<f64>) =
            serde_json::from_str(&text).map_err(|e| {
                RunError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?;
        Ok(Grid3::from_data(dims.0, dims.1, dims.2, data))
    }
}

impl GridWriter for JsonGridIo {
    fn write(&self, path: &Path, grid: &Grid3, _p: usize, _q: usize) -> Result<(), RunError> {
        let payload = ((grid.nz, grid.ny, grid.nx), grid.data().to_vec());
        let text = serde_json::to_string(&payload).map_err(|e| {
            RunError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        fs::write(path, text).map_err(|e| RunError::io(path, e))
    }
}

fn test_domain(root: &Path) -> DomainState {
    let config = DomainConfig {
        name: "wolf".to_string(),
        huc_id: "15040001".to_string(),
        dry_year: 2002,
        average_year: 2008,
        wet_year: 2005,
        p: 1,
        q: 1,
        dz: vec![100.0, 50.0, 25.0],
        testing: true,
        flux_policy: FluxPolicy::default(),
    };
    DomainState::from_config(config, root)
}

/// Materializes base inputs for every wetness class.
fn write_base_inputs(domain: &DomainState) {
    let io = JsonGridIo;
    let mut mask = Grid3::zeros(1, 2, 2);
    for y in 0..2 {
        for x in 0..2 {
            mask.set(0, y, x, 1.0);
        }
    }
    for wetness in Wetness::all() {
        let dir = domain.base_input_dir(wetness);
        fs::create_dir_all(&dir).unwrap();
        io.write(&dir.join("mask.pfb"), &mask, 1, 1).unwrap();
        fs::write(dir.join("drv_vegm.dat"), VEGM).unwrap();
        fs::write(dir.join("drv_vegp.dat"), "default vegetation params\n").unwrap();
        fs::write(
            dir.join("drv_vegp_for_irrigation.dat"),
            "irrigation vegetation params\n",
        )
        .unwrap();
    }
}

fn year(wetness: Wetness, fraction: f64, irrigation: bool) -> ScenarioYear {
    ScenarioYear::new(wetness, fraction, irrigation).unwrap()
}

#[test]
fn single_baseline_year_runs_without_forcing() {
    let tmp = tempfile::tempdir().unwrap();
    let domain = test_domain(tmp.path());
    write_base_inputs(&domain);

    let solver = MockSolver::new(domain.num_output_files());
    let io = JsonGridIo;
    let runner = SequenceRunner::new(&domain, &solver, &io, &io, FluxMode::Static);

    let sequence =
        ScenarioSequence::new("baseline", vec![year(Wetness::Average, 0.0, false)]).unwrap();
    let dirs = runner.run_sequence(&sequence).unwrap();

    assert_eq!(dirs.len(), 1);
    assert_eq!(solver.count(), 1);

    // No pumping means the flux builder never ran: no flux files, no forcing.
    let config = solver.config_at(0);
    assert!(config.forcing.is_none());
    assert!(config.irrigation.is_none());
    assert!(config.initial_pressure_file.is_none());
    assert!(!dirs[0].join("fluxes_on.pfb").exists());

    // Provenance and completion marking are in place.
    assert!(dirs[0].join("sequence.json").exists());
    assert!(dirs[0].join("complete.json").exists());
    assert!(dirs[0].join("solver_config.json").exists());
}

#[test]
fn shared_prefix_is_executed_exactly_once() {
    let tmp = tempfile::tempdir().unwrap();
    let domain = test_domain(tmp.path());
    write_base_inputs(&domain);

    let solver = MockSolver::new(domain.num_output_files());
    let io = JsonGridIo;
    let runner = SequenceRunner::new(&domain, &solver, &io, &io, FluxMode::Static);

    let a = year(Wetness::Average, 0.0, false);
    let b = year(Wetness::Dry, 0.5, false);
    let s1 = ScenarioSequence::new(
        "s1",
        vec![a.clone(), b.clone(), year(Wetness::Wet, 0.0, false)],
    )
    .unwrap();
    let s2 = ScenarioSequence::new("s2", vec![a, b, year(Wetness::Dry, 1.0, true)]).unwrap();

    let dirs1 = runner.run_sequence(&s1).unwrap();
    assert_eq!(solver.count(), 3);

    // The second ensemble member shares [A, B]; only its final year runs.
    let dirs2 = runner.run_sequence(&s2).unwrap();
    assert_eq!(solver.count(), 4);
    assert_eq!(dirs1[0], dirs2[0]);
    assert_eq!(dirs1[1], dirs2[1]);
    assert_ne!(dirs1[2], dirs2[2]);

    // Replaying the first sequence is a pure cache walk.
    let replay = runner.run_sequence(&s1).unwrap();
    assert_eq!(solver.count(), 4);
    assert_eq!(replay, dirs1);
}

#[test]
fn terminal_state_chains_into_next_year() {
    let tmp = tempfile::tempdir().unwrap();
    let domain = test_domain(tmp.path());
    write_base_inputs(&domain);

    let solver = MockSolver::new(domain.num_output_files());
    let io = JsonGridIo;
    let runner = SequenceRunner::new(&domain, &solver, &io, &io, FluxMode::Static);

    let sequence = ScenarioSequence::new(
        "chain",
        vec![
            year(Wetness::Dry, 0.5, false),
            year(Wetness::Average, 0.5, true),
            year(Wetness::Wet, 0.0, false),
        ],
    )
    .unwrap();
    let dirs = runner.run_sequence(&sequence).unwrap();
    assert_eq!(solver.count(), 3);

    let terminal_name = format!("run.out.press.{:05}.pfb", domain.num_output_files());

    // Year 1 starts from the base input's default initial condition.
    assert!(solver.config_at(0).initial_pressure_file.is_none());
    // Each later year starts from its predecessor's terminal state.
    for k in 1..3 {
        let expected = dirs[k - 1].join(&terminal_name);
        assert_eq!(
            solver.config_at(k).initial_pressure_file.as_deref(),
            Some(expected.as_path()),
            "year {} must chain from year {}'s terminal state",
            k + 1,
            k
        );
        assert!(expected.exists());
    }
}

#[test]
fn irrigation_year_gets_forcing_and_vegetation_swap() {
    let tmp = tempfile::tempdir().unwrap();
    let domain = test_domain(tmp.path());
    write_base_inputs(&domain);

    let solver = MockSolver::new(domain.num_output_files());
    let io = JsonGridIo;
    let runner = SequenceRunner::new(&domain, &solver, &io, &io, FluxMode::Static);

    let sequence = ScenarioSequence::new(
        "irrigated",
        vec![year(Wetness::Dry, 0.5, false), year(Wetness::Average, 0.5, true)],
    )
    .unwrap();
    let dirs = runner.run_sequence(&sequence).unwrap();

    // Year 1: pumping without irrigation.
    let config1 = solver.config_at(0);
    assert!(config1.forcing.is_some());
    assert!(config1.irrigation.is_none());

    // Year 2: pumping plus irrigation forcing.
    let config2 = solver.config_at(1);
    let forcing = config2.forcing.expect("year 2 must carry flux forcing");
    assert_eq!(forcing.file_name, "fluxes_on.pfb");
    assert!(!forcing.transient);
    let irrigation = config2.irrigation.expect("year 2 must carry irrigation");
    assert!(irrigation.application_rate > 0.0);

    // The flux grid was written and is non-zero somewhere.
    let flux = JsonGridIo.read(&dirs[1].join("fluxes_on.pfb")).unwrap();
    assert!(flux.data().iter().any(|v| *v < 0.0));

    // The irrigation vegetation parameters replaced the default table.
    let vegp = fs::read_to_string(dirs[1].join("drv_vegp.dat")).unwrap();
    assert_eq!(vegp, "irrigation vegetation params\n");
    // The non-irrigated year keeps the default.
    let vegp1 = fs::read_to_string(dirs[0].join("drv_vegp.dat")).unwrap();
    assert_eq!(vegp1, "default vegetation params\n");
}

#[test]
fn missing_base_inputs_abort_the_sequence() {
    let tmp = tempfile::tempdir().unwrap();
    let domain = test_domain(tmp.path());
    // No base inputs written.

    let solver = MockSolver::new(domain.num_output_files());
    let io = JsonGridIo;
    let runner = SequenceRunner::new(&domain, &solver, &io, &io, FluxMode::Static);

    let sequence =
        ScenarioSequence::new("orphan", vec![year(Wetness::Average, 0.0, false)]).unwrap();
    let err = runner.run_sequence(&sequence).unwrap_err();
    assert!(matches!(
        err,
        droughtseq::DroughtError::Run(RunError::InputMissing { .. })
    ));
    assert_eq!(solver.count(), 0);
}

#[test]
fn solver_failure_leaves_no_completion_sentinel() {
    struct FailingSolver;

    impl Solver for FailingSolver {
        fn run(&self, _config: &SolverConfig, workdir: &Path) -> Result<(), RunError> {
            Err(RunError::SolverExecution {
                run: workdir.display().to_string(),
                reason: "exit status 139".to_string(),
            })
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    let domain = test_domain(tmp.path());
    write_base_inputs(&domain);

    let io = JsonGridIo;
    let solver = FailingSolver;
    let runner = SequenceRunner::new(&domain, &solver, &io, &io, FluxMode::Static);

    let sequence =
        ScenarioSequence::new("crash", vec![year(Wetness::Average, 0.0, false)]).unwrap();
    let err = runner.run_sequence(&sequence).unwrap_err();
    assert!(err.is_solver_failure());

    // The partial directory remains (operators inspect it) but carries no
    // sentinel, so a retry reports corruption instead of a false cache hit.
    let dirs = runner.output_folders(&sequence);
    assert!(dirs[0].exists());
    assert!(!dirs[0].join("complete.json").exists());

    let retry = runner.run_sequence(&sequence).unwrap_err();
    assert!(retry.is_cache_corruption());
}

#[test]
fn solver_that_produces_no_terminal_file_is_an_error() {
    struct SilentSolver;

    impl Solver for SilentSolver {
        fn run(&self, _config: &SolverConfig, _workdir: &Path) -> Result<(), RunError> {
            Ok(())
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    let domain = test_domain(tmp.path());
    write_base_inputs(&domain);

    let io = JsonGridIo;
    let solver = SilentSolver;
    let runner = SequenceRunner::new(&domain, &solver, &io, &io, FluxMode::Static);

    let sequence =
        ScenarioSequence::new("silent", vec![year(Wetness::Average, 0.0, false)]).unwrap();
    let err = runner.run_sequence(&sequence).unwrap_err();
    assert!(err.is_solver_failure());
}

#[test]
fn provenance_record_matches_prefix() {
    let tmp = tempfile::tempdir().unwrap();
    let domain = test_domain(tmp.path());
    write_base_inputs(&domain);

    let solver = MockSolver::new(domain.num_output_files());
    let io = JsonGridIo;
    let runner = SequenceRunner::new(&domain, &solver, &io, &io, FluxMode::Static);

    let sequence = ScenarioSequence::new(
        "prov",
        vec![year(Wetness::Dry, 0.0, false), year(Wetness::Wet, 0.5, false)],
    )
    .unwrap();
    let dirs = runner.run_sequence(&sequence).unwrap();

    let recorded: Vec<ScenarioYear> =
        serde_json::from_str(&fs::read_to_string(dirs[1].join("sequence.json")).unwrap()).unwrap();
    assert_eq!(recorded, sequence.years);

    let first: Vec<ScenarioYear> =
        serde_json::from_str(&fs::read_to_string(dirs[0].join("sequence.json")).unwrap()).unwrap();
    assert_eq!(first, sequence.years[..1]);
}
